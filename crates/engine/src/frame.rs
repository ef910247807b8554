//! Per-frame render and update.
//!
//! One tick draws everything in insertion order onto a [`Surface`] and then
//! advances the animated kinds. Ticking is deterministic for a given RNG, so
//! tests can step the world N frames instead of running it forever.

use crate::images::ImageBank;
use crate::model::{ImageId, PlacedObject, Resident};
use crate::world::World;
use hamlet_protocol::{Color, DrawCommand, Frame, Point};
use rand::Rng;

/// Residents are drawn as square sprites of this size.
pub const RESIDENT_SPRITE: f64 = 20.0;
/// Fraction of the remaining distance a homeward resident covers per frame.
pub const APPROACH_RATE: f64 = 0.01;
pub const COMPANY_FONT: &str = "10px Arial";

pub trait Surface {
    /// Pixel width and height.
    fn size(&self) -> (f64, f64);
    fn clear(&mut self);
    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Color);
    fn fill_circle(&mut self, x: f64, y: f64, radius: f64, color: Color);
    fn fill_text(&mut self, text: &str, x: f64, y: f64, color: Color, font: &str);
    fn stroke_path(&mut self, points: &[Point], color: Color, line_width: f64);
    fn draw_image(&mut self, image: &ImageId, x: f64, y: f64, width: f64, height: f64);
}

/// Surface that records draw commands into a [`Frame`].
#[derive(Debug, Clone)]
pub struct FrameRecorder {
    frame: Frame,
}

impl FrameRecorder {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            frame: Frame::blank(width, height),
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.frame.commands
    }

    pub fn finish(mut self, seq: u64) -> Frame {
        self.frame.seq = seq;
        self.frame
    }

    fn push(&mut self, cmd: DrawCommand) {
        self.frame.commands.push(cmd);
    }
}

impl Surface for FrameRecorder {
    fn size(&self) -> (f64, f64) {
        (self.frame.width, self.frame.height)
    }

    fn clear(&mut self) {
        self.frame.commands.clear();
        self.push(DrawCommand::Clear {
            width: self.frame.width,
            height: self.frame.height,
        });
    }

    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Color) {
        self.push(DrawCommand::FillRect {
            x,
            y,
            width,
            height,
            color,
        });
    }

    fn fill_circle(&mut self, x: f64, y: f64, radius: f64, color: Color) {
        self.push(DrawCommand::FillCircle { x, y, radius, color });
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64, color: Color, font: &str) {
        self.push(DrawCommand::FillText {
            x,
            y,
            text: text.to_string(),
            color,
            font: font.to_string(),
        });
    }

    fn stroke_path(&mut self, points: &[Point], color: Color, line_width: f64) {
        self.push(DrawCommand::StrokePath {
            points: points.to_vec(),
            color,
            line_width,
        });
    }

    fn draw_image(&mut self, image: &ImageId, x: f64, y: f64, width: f64, height: f64) {
        self.push(DrawCommand::DrawImage {
            image: image.to_string(),
            x,
            y,
            width,
            height,
        });
    }
}

fn road_style(highway: bool) -> (Color, f64) {
    if highway {
        (Color::Red, 8.0)
    } else {
        (Color::Gray, 5.0)
    }
}

impl World {
    /// Draw one frame and advance every animated record by one step.
    pub fn tick<S, R>(&mut self, surface: &mut S, rng: &mut R)
    where
        S: Surface + ?Sized,
        R: Rng + ?Sized,
    {
        self.drain_arrivals();
        surface.clear();
        let (surface_width, _) = surface.size();

        for obj in self.objects.iter_mut() {
            draw_object(obj, surface);
            advance_object(obj, surface_width);
        }

        if let Some(draft) = &self.road_draft {
            if draft.points.len() >= 2 {
                let (color, width) = road_style(draft.highway);
                surface.stroke_path(&draft.points, color, width);
            }
        }

        for resident in self.residents.iter_mut() {
            draw_resident(resident, &self.images, surface);
            advance_resident(resident, &self.objects, rng);
        }
    }

    /// Tick `n` times, keeping only the last frame's drawing.
    pub fn run_ticks<S, R>(&mut self, n: usize, surface: &mut S, rng: &mut R)
    where
        S: Surface + ?Sized,
        R: Rng + ?Sized,
    {
        for _ in 0..n {
            self.tick(surface, rng);
        }
    }
}

fn draw_object<S: Surface + ?Sized>(obj: &PlacedObject, surface: &mut S) {
    match obj {
        PlacedObject::Foundation {
            x,
            y,
            width,
            height,
        } => surface.fill_rect(*x, *y, *width as f64, *height as f64, Color::Brown),
        PlacedObject::Wheel { x, y, radius } => {
            surface.fill_circle(*x, *y, *radius as f64, Color::Black)
        }
        PlacedObject::House {
            x,
            y,
            width,
            height,
        } => surface.fill_rect(*x, *y, *width as f64, *height as f64, Color::Blue),
        PlacedObject::Company {
            x,
            y,
            width,
            height,
            name,
        } => {
            surface.fill_rect(*x, *y, *width as f64, *height as f64, Color::Green);
            surface.fill_text(name, x + 5.0, y + 15.0, Color::White, COMPANY_FONT);
        }
        PlacedObject::Road { points, highway } => {
            let (color, width) = road_style(*highway);
            surface.stroke_path(points, color, width);
        }
        PlacedObject::Car {
            x,
            y,
            width,
            height,
            ..
        } => surface.fill_rect(*x, *y, *width as f64, *height as f64, Color::Purple),
    }
}

fn advance_object(obj: &mut PlacedObject, surface_width: f64) {
    match obj {
        PlacedObject::Car { x, width, speed, .. } => {
            *x += *speed as f64;
            if *x > surface_width {
                *x = -(*width as f64);
            }
        }
        PlacedObject::Foundation { .. }
        | PlacedObject::Wheel { .. }
        | PlacedObject::House { .. }
        | PlacedObject::Company { .. }
        | PlacedObject::Road { .. } => {}
    }
}

fn draw_resident<S: Surface + ?Sized>(resident: &Resident, images: &ImageBank, surface: &mut S) {
    if images.is_ready(&resident.image) {
        surface.draw_image(
            &resident.image,
            resident.x,
            resident.y,
            RESIDENT_SPRITE,
            RESIDENT_SPRITE,
        );
    }
}

fn advance_resident<R: Rng + ?Sized>(resident: &mut Resident, objects: &[PlacedObject], rng: &mut R) {
    use crate::model::Action;

    match resident.action {
        Action::Wander => {
            resident.x += rng.gen_range(-1.0..=1.0);
            resident.y += rng.gen_range(-1.0..=1.0);
        }
        Action::Idle => {}
    }

    let home = resident
        .target_house
        .and_then(|i| objects.get(i))
        .filter(|o| o.is_house())
        .map(PlacedObject::position);
    if let Some(home) = home {
        resident.x += (home.x - resident.x) * APPROACH_RATE;
        resident.y += (home.y - resident.y) * APPROACH_RATE;
    }
}
