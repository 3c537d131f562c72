use crate::detector::FaceBox;
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent},
    terminal::{self, ClearType},
};
use image::DynamicImage;
use std::io::{self, Write};

const ASCII_RAMP: &str = " .·:;+=xX#@";
const DEFAULT_WIDTH: usize = 80;
const DEFAULT_HEIGHT: usize = 30;

/// Key presses the capture loop reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKey {
    Save,
    Cancel,
}

/// A face box to overlay, optionally labeled with a resolved username.
pub struct LabeledFace<'a> {
    pub face: &'a FaceBox,
    pub label: Option<&'a str>,
}

/// Renders camera frames as ASCII art with face-box overlays. The terminal
/// is the display surface; there is no GUI window.
pub struct AsciiRenderer {
    width: usize,
    height: usize,
}

impl AsciiRenderer {
    pub fn new(width: Option<usize>, height: Option<usize>) -> Self {
        let (term_width, term_height) = terminal::size()
            .map(|(w, h)| (w as usize, h as usize))
            .unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT));

        // Half resolution keeps per-frame rendering cheap
        Self {
            width: width.unwrap_or((term_width / 2).min(DEFAULT_WIDTH / 2)),
            height: height.unwrap_or((term_height.saturating_sub(5) / 2).min(DEFAULT_HEIGHT / 2)),
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn render_frame(&self, image: &DynamicImage, faces: &[LabeledFace<'_>]) -> String {
        let mut grid = self.image_to_ascii(image);

        let img_width = image.width() as f32;
        let img_height = image.height() as f32;

        for labeled in faces {
            self.draw_face_box(&mut grid, labeled.face, img_width, img_height);

            if let Some(label) = labeled.label {
                // Name sits just below the box, like the box caption in a
                // GUI overlay
                let x1 = ((labeled.face.x1 / img_width) * self.width as f32) as usize;
                let x2 = ((labeled.face.x2 / img_width) * self.width as f32) as usize;
                let y2 = ((labeled.face.y2 / img_height) * self.height as f32) as usize;
                let center_x = (x1 + x2) / 2;
                let label_y = y2.min(self.height.saturating_sub(1));
                self.overlay_text(&mut grid, label, center_x, label_y);
            }
        }

        self.grid_to_string(&grid)
    }

    fn image_to_ascii(&self, image: &DynamicImage) -> Vec<Vec<char>> {
        let mut grid = vec![vec![' '; self.width]; self.height];

        let gray = image.to_luma8();
        let (img_width, img_height) = gray.dimensions();

        for term_y in 0..self.height {
            for term_x in 0..self.width {
                let img_x = (term_x as f32 / self.width as f32 * img_width as f32) as u32;
                let img_y = (term_y as f32 / self.height as f32 * img_height as f32) as u32;

                if img_x < img_width && img_y < img_height {
                    let brightness = gray.get_pixel(img_x, img_y)[0];
                    let char_idx = (brightness as usize * (ASCII_RAMP.len() - 1)) / 255;
                    grid[term_y][term_x] = ASCII_RAMP.chars().nth(char_idx).unwrap_or(' ');
                }
            }
        }

        grid
    }

    fn overlay_text(&self, grid: &mut [Vec<char>], text: &str, center_x: usize, y: usize) {
        if y >= self.height {
            return;
        }

        let start_x = center_x.saturating_sub(text.len() / 2);
        for (i, ch) in text.chars().enumerate() {
            let x = start_x + i;
            if x < self.width {
                grid[y][x] = ch;
            }
        }
    }

    fn draw_face_box(&self, grid: &mut [Vec<char>], face: &FaceBox, img_width: f32, img_height: f32) {
        let x1 = ((face.x1 / img_width) * self.width as f32) as usize;
        let x2 = ((face.x2 / img_width) * self.width as f32) as usize;
        let y1 = ((face.y1 / img_height) * self.height as f32) as usize;
        let y2 = ((face.y2 / img_height) * self.height as f32) as usize;

        if y1 < self.height && x1 < self.width {
            grid[y1][x1] = '┌';
        }
        if y1 < self.height && x2 < self.width {
            grid[y1][x2.saturating_sub(1)] = '┐';
        }
        if y2 < self.height && x1 < self.width {
            grid[y2.saturating_sub(1)][x1] = '└';
        }
        if y2 < self.height && x2 < self.width {
            grid[y2.saturating_sub(1)][x2.saturating_sub(1)] = '┘';
        }

        for x in (x1 + 1)..(x2.saturating_sub(1)).min(self.width) {
            if y1 < self.height {
                grid[y1][x] = '─';
            }
            if y2.saturating_sub(1) < self.height {
                grid[y2.saturating_sub(1)][x] = '─';
            }
        }

        for y in (y1 + 1)..(y2.saturating_sub(1)).min(self.height) {
            if x1 < self.width {
                grid[y][x1] = '│';
            }
            if x2.saturating_sub(1) < self.width {
                grid[y][x2.saturating_sub(1)] = '│';
            }
        }
    }

    fn grid_to_string(&self, grid: &[Vec<char>]) -> String {
        grid.iter()
            .map(|row| row.iter().take(self.width).collect::<String>())
            .collect::<Vec<_>>()
            .join("\r\n")
    }
}

/// Raw-mode guard: enables raw mode and hides the cursor on construction,
/// restores both when dropped. This is how the capture loop guarantees the
/// terminal is sane on every exit path.
pub struct TerminalGuard;

impl TerminalGuard {
    pub fn new() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        crossterm::execute!(io::stdout(), cursor::Hide).ok();
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        crossterm::execute!(io::stdout(), cursor::Show).ok();
        terminal::disable_raw_mode().ok();
    }
}

pub fn clear_screen() -> io::Result<()> {
    crossterm::execute!(
        io::stdout(),
        terminal::Clear(ClearType::All),
        cursor::MoveTo(0, 0)
    )?;
    io::stdout().flush()
}

/// Non-blocking key poll, once per frame.
pub fn poll_key() -> io::Result<Option<CaptureKey>> {
    if event::poll(std::time::Duration::from_millis(0))? {
        if let Event::Key(KeyEvent { code, .. }) = event::read()? {
            return Ok(match code {
                KeyCode::Char('s') => Some(CaptureKey::Save),
                KeyCode::Char('q') | KeyCode::Esc => Some(CaptureKey::Cancel),
                _ => None,
            });
        }
    }
    Ok(None)
}
