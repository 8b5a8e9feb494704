use super::draw::{blit, draw_circle, scaled, RED};
use fiducial_rig_core::{Rgb, RgbImage};

/// Ring drawn around a tracked marker.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub x: i32,
    pub y: i32,
    pub radius: i32,
    pub thickness: i32,
    pub color: Rgb<u8>,
}

impl Node {
    pub const RADIUS: i32 = 20;
    pub const THICKNESS: i32 = 5;

    pub fn new(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            radius: Self::RADIUS,
            thickness: Self::THICKNESS,
            color: RED,
        }
    }
}

/// Fixed image, scaled once when created.
#[derive(Clone, Debug, PartialEq)]
pub struct StaticImage {
    pub x: i32,
    pub y: i32,
    image: RgbImage,
}

impl StaticImage {
    pub fn new(x: i32, y: i32, image: &RgbImage, scale: f32) -> Self {
        Self {
            x,
            y,
            image: scaled(image, scale),
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RenderObject {
    Node(Node),
    StaticImage(StaticImage),
}

impl RenderObject {
    pub fn render(&self, frame: &mut RgbImage) {
        match self {
            RenderObject::Node(n) => draw_circle(frame, (n.x, n.y), n.radius, n.thickness, n.color),
            RenderObject::StaticImage(s) => blit(frame, &s.image, s.x, s.y),
        }
    }

    /// Move the object. Static images stay where they were placed.
    pub fn update(&mut self, x: i32, y: i32) {
        match self {
            RenderObject::Node(n) => {
                n.x = x;
                n.y = y;
            }
            RenderObject::StaticImage(_) => {}
        }
    }

    pub fn position(&self) -> (i32, i32) {
        match self {
            RenderObject::Node(n) => (n.x, n.y),
            RenderObject::StaticImage(s) => (s.x, s.y),
        }
    }
}

impl From<Node> for RenderObject {
    fn from(node: Node) -> Self {
        RenderObject::Node(node)
    }
}

impl From<StaticImage> for RenderObject {
    fn from(image: StaticImage) -> Self {
        RenderObject::StaticImage(image)
    }
}
