use clap::Parser;

mod emulator;
mod settings;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let settings = settings::Settings::parse();
    let mut emulator = emulator::Emulator::new(settings)?;

    emulator.run()?;

    Ok(())
}
