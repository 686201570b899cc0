use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use chip8_engine::{Chip8, DISPLAY_HEIGHT, DISPLAY_WIDTH, Fault, Key, PixelBuffer};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use log::{error, warn};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::Alignment,
    style::{Color, Style},
    widgets::{Block, Borders, Paragraph},
};
use rodio::{OutputStream, Sink, Source, source::SineWave};

use crate::settings::Settings;

type Tui = Terminal<CrosstermBackend<std::io::Stdout>>;

/// Host keys in keypad order: `1234/QWER/ASDF/ZXCV` laid over the 4x4 hex pad.
const KEY_MAP: [(char, Key); 16] = [
    ('1', Key::Key1),
    ('2', Key::Key2),
    ('3', Key::Key3),
    ('4', Key::KeyC),
    ('q', Key::Key4),
    ('w', Key::Key5),
    ('e', Key::Key6),
    ('r', Key::KeyD),
    ('a', Key::Key7),
    ('s', Key::Key8),
    ('d', Key::Key9),
    ('f', Key::KeyE),
    ('z', Key::KeyA),
    ('x', Key::Key0),
    ('c', Key::KeyB),
    ('v', Key::KeyF),
];

fn map_key(c: char) -> Option<Key> {
    let c = c.to_ascii_lowercase();
    KEY_MAP
        .iter()
        .find(|(host, _)| *host == c)
        .map(|&(_, key)| key)
}

pub struct Beep {
    sink: Sink,
    #[allow(dead_code)]
    stream: OutputStream,
}

impl Beep {
    pub fn new(freq: f32) -> anyhow::Result<Self> {
        let (stream, stream_handle) = OutputStream::try_default()?;
        let sink = Sink::try_new(&stream_handle)?;
        let source = SineWave::new(freq).repeat_infinite();

        sink.append(source);
        sink.pause();

        Ok(Self { sink, stream })
    }

    pub fn on(&mut self) {
        self.sink.play();
    }

    pub fn off(&mut self) {
        self.sink.pause();
    }
}

enum Control {
    Continue,
    Quit,
}

pub struct Emulator {
    settings: Settings,
    chip8: Chip8,
    beeper: Option<Beep>,
    /// Set once PC runs off the end of memory; no further steps are taken.
    stalled: bool,
}

impl Emulator {
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        settings.validate()?;

        let chip8 = match settings.seed {
            Some(seed) => Chip8::with_seed(seed),
            None => Chip8::new(),
        };
        let beeper = match Beep::new(settings.tone) {
            Ok(beep) => Some(beep),
            Err(e) => {
                warn!("Audio unavailable, running silently: {e}");
                None
            }
        };

        Ok(Self::from_parts(settings, chip8, beeper))
    }

    fn from_parts(settings: Settings, chip8: Chip8, beeper: Option<Beep>) -> Self {
        Emulator {
            settings,
            chip8,
            beeper,
            stalled: false,
        }
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        let rom_data = std::fs::read(&self.settings.rom)
            .with_context(|| format!("reading ROM {}", self.settings.rom.display()))?;
        self.chip8.reset();
        self.chip8.load(&rom_data)?;

        enable_raw_mode()?;
        let mut terminal = Terminal::new(CrosstermBackend::new(std::io::stdout()))?;
        terminal.clear()?;

        let result = self.main_loop(&mut terminal);

        terminal.clear()?;
        disable_raw_mode()?;
        result
    }

    fn main_loop(&mut self, terminal: &mut Tui) -> anyhow::Result<()> {
        let frame_duration = Duration::from_secs_f64(1.0 / self.settings.frame_rate as f64);
        let instructions_per_frame = self.settings.instructions_per_frame();
        let rom_name = self.settings.rom_name();

        loop {
            let frame_start = Instant::now();

            if let Control::Quit = self.poll_input()? {
                return Ok(());
            }

            self.chip8.tick_timers();
            self.update_beeper();

            self.run_steps(instructions_per_frame)?;

            terminal.draw(|frame| draw(frame, self.chip8.pixels(), &rom_name))?;
            // Terminals rarely report key releases, so a press lasts one frame
            self.chip8.release_keys();

            let elapsed = frame_start.elapsed();
            if elapsed < frame_duration {
                std::thread::sleep(frame_duration - elapsed);
            }
        }
    }

    /// Runs up to `count` instructions, stopping early in strict mode or once PC leaves memory.
    fn run_steps(&mut self, count: u64) -> anyhow::Result<()> {
        for _ in 0..count {
            if self.stalled {
                break;
            }
            let pc = self.chip8.pc();
            match self.chip8.step() {
                Ok(_) => {}
                Err(fault) if self.settings.strict => bail!("halted at {pc:#05X}: {fault}"),
                Err(Fault::ProgramCounterOutOfBounds { .. }) => {
                    error!("Execution stopped: program counter left memory at {pc:#05X}");
                    self.stalled = true;
                }
                Err(_) => {}
            }
        }
        Ok(())
    }

    fn poll_input(&mut self) -> anyhow::Result<Control> {
        while event::poll(Duration::ZERO)? {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            match key.code {
                KeyCode::Esc => return Ok(Control::Quit),
                KeyCode::Char(c) => {
                    if let Some(mapped) = map_key(c) {
                        self.chip8
                            .set_key(mapped, key.kind != KeyEventKind::Release);
                    }
                }
                _ => {}
            }
        }
        Ok(Control::Continue)
    }

    fn update_beeper(&mut self) {
        let sounding = self.chip8.sound_timer() > 0;
        if let Some(beeper) = self.beeper.as_mut() {
            if sounding {
                beeper.on();
            } else {
                beeper.off();
            }
        }
    }
}

fn render_pixels(pixels: &PixelBuffer) -> String {
    let mut row_string = String::with_capacity(DISPLAY_WIDTH * DISPLAY_HEIGHT + DISPLAY_HEIGHT);
    for row in pixels.rows() {
        row_string.extend(row.map(|lit| if lit { '█' } else { ' ' }));
        row_string.push('\n');
    }
    row_string
}

fn draw(frame: &mut ratatui::Frame, pixels: &PixelBuffer, rom_name: &str) {
    use ratatui::layout::{Constraint, Direction, Layout};

    let game_width = (DISPLAY_WIDTH as u16) + 2;
    let game_height = (DISPLAY_HEIGHT as u16) + 2;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(game_height),
            Constraint::Length(7),
            Constraint::Min(0),
        ])
        .split(frame.area());

    // Center the game horizontally if the terminal is wider than needed
    let game_area = if chunks[0].width > game_width {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Min(0),
                Constraint::Length(game_width),
                Constraint::Min(0),
            ])
            .split(chunks[0])[1]
    } else {
        chunks[0]
    };

    let game_paragraph = Paragraph::new(render_pixels(pixels))
        .block(Block::default().borders(Borders::ALL).title(rom_name))
        .style(Style::default().fg(Color::White));
    frame.render_widget(game_paragraph, game_area);

    let key_mapping = "Key Mapping:\n\
    1 2 3 4    →    1 2 3 C\n\
    Q W E R    →    4 5 6 D\n\
    A S D F    →    7 8 9 E\n\
    Z X C V    →    A 0 B F";
    let key_paragraph = Paragraph::new(key_mapping)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title("Keypad"))
        .style(Style::default().fg(Color::Yellow));
    frame.render_widget(key_paragraph, chunks[1]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn host_keys_map_onto_hex_pad() {
        assert_eq!(map_key('1'), Some(Key::Key1));
        assert_eq!(map_key('4'), Some(Key::KeyC));
        assert_eq!(map_key('X'), Some(Key::Key0));
        assert_eq!(map_key('v'), Some(Key::KeyF));
        assert_eq!(map_key('p'), None);
    }

    #[test]
    fn every_keypad_key_is_reachable() {
        for key in Key::ALL {
            assert!(KEY_MAP.iter().any(|&(_, mapped)| mapped == key), "{key:?}");
        }
    }

    #[test]
    fn pixels_render_as_text_rows() {
        let mut pixels = PixelBuffer::new();
        pixels.draw_sprite(0, 0, &[0xC0]);
        let text = render_pixels(&pixels);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), DISPLAY_HEIGHT);
        assert!(lines[0].starts_with("██ "));
        assert_eq!(lines[0].chars().count(), DISPLAY_WIDTH);
    }

    fn emulator_with_rom(args: &[&str], rom: &[u8]) -> Emulator {
        let settings = Settings::try_parse_from(args).unwrap();
        let mut chip8 = Chip8::with_seed(0);
        chip8.load(rom).unwrap();
        Emulator::from_parts(settings, chip8, None)
    }

    #[test]
    fn strict_mode_names_the_faulting_address() {
        // LD V0, 1; then an unrecognized opcode at 0x202
        let mut emulator = emulator_with_rom(&["chip8", "--strict", "game.ch8"], &[0x60, 0x01, 0xFF, 0xFF]);
        let err = emulator.run_steps(5).unwrap_err().to_string();
        assert!(err.starts_with("halted at 0x202:"), "{err}");
        assert_eq!(emulator.chip8.pc(), 0x204);
    }

    #[test]
    fn lenient_mode_skips_unrecognized_opcodes() {
        let mut emulator = emulator_with_rom(&["chip8", "game.ch8"], &[0xFF, 0xFF, 0x60, 0x01]);
        emulator.run_steps(2).unwrap();
        assert!(!emulator.stalled);
        assert_eq!(emulator.chip8.pc(), 0x204);
    }

    #[test]
    fn running_off_the_end_of_memory_stops_stepping() {
        // JP 0xFFF
        let mut emulator = emulator_with_rom(&["chip8", "game.ch8"], &[0x1F, 0xFF]);
        emulator.run_steps(10).unwrap();
        assert!(emulator.stalled);
        assert_eq!(emulator.chip8.pc(), 0xFFF);

        emulator.run_steps(10).unwrap();
        assert_eq!(emulator.chip8.pc(), 0xFFF);
    }
}
