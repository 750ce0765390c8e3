//! Index-encoded picking.
//!
//! Every pickable element is drawn into an offscreen target with a flat color
//! that encodes its identity. Reading back a single pixel under the cursor
//! then names the hovered element without any geometric hit testing.

use serde::{Deserialize, Serialize};
use sketch_engine::EntityGraph;
use sketch_types::{EntityData, EntityId, EntityKind};

/// Largest entity id that fits in the 28 id bits (0 is the background).
pub const MAX_ENTITY_INDEX: u32 = (1 << 28) - 2;
/// Largest sub-element index that fits in the 4 low bits.
pub const MAX_SUB_INDEX: u8 = 14;

const SUB_BITS: u32 = 4;
const SUB_MASK: u32 = (1 << SUB_BITS) - 1;

/// The element under a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PickHit {
    pub entity: EntityId,
    /// Sub-element within the entity, if one was encoded.
    pub sub: Option<u8>,
}

impl PickHit {
    pub fn entity(entity: EntityId) -> Self {
        Self { entity, sub: None }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PickError {
    #[error("{entity} exceeds the pickable range")]
    EntityOutOfRange { entity: EntityId },

    #[error("sub-element {sub} exceeds {MAX_SUB_INDEX}")]
    SubOutOfRange { sub: u8 },

    #[error("pixel ({x}, {y}) is outside the {width}x{height} target")]
    PixelOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
}

/// Pack an entity id and optional sub-element into a big-endian RGBA color.
pub fn encode(entity: EntityId, sub: Option<u8>) -> Result<[u8; 4], PickError> {
    if entity.0 > MAX_ENTITY_INDEX {
        return Err(PickError::EntityOutOfRange { entity });
    }
    let low = match sub {
        Some(s) if s > MAX_SUB_INDEX => return Err(PickError::SubOutOfRange { sub: s }),
        Some(s) => u32::from(s) + 1,
        None => 0,
    };
    Ok((((entity.0 + 1) << SUB_BITS) | low).to_be_bytes())
}

/// Inverse of [`encode`]. The background and malformed colors decode to `None`.
pub fn decode(rgba: [u8; 4]) -> Option<PickHit> {
    let packed = u32::from_be_bytes(rgba);
    let id = packed >> SUB_BITS;
    if id == 0 {
        return None;
    }
    let sub = match packed & SUB_MASK {
        0 => None,
        n => Some((n - 1) as u8),
    };
    Some(PickHit {
        entity: EntityId(id - 1),
        sub,
    })
}

// ── Render boundary ──────────────────────────────────────────────────────────

/// Axis-aligned pixel rectangle, inclusive of `min`, exclusive of `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub min: [i64; 2],
    pub max: [i64; 2],
}

impl PixelRect {
    /// Square of side `size` centred on a pixel position.
    pub fn around(center: [f64; 2], size: u32) -> Self {
        let half = f64::from(size) / 2.0;
        let min = [
            (center[0] - half).floor() as i64,
            (center[1] - half).floor() as i64,
        ];
        let side = i64::from(size.max(1));
        Self {
            min,
            max: [min[0] + side, min[1] + side],
        }
    }
}

/// One element to draw: its color and the pixels it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct PickItem {
    pub hit: PickHit,
    pub color: [u8; 4],
    pub footprint: Vec<PixelRect>,
}

/// Offscreen target the host renders index colors into.
pub trait IndexRenderTarget {
    /// Reset every pixel to the background.
    fn clear(&mut self);

    /// Draw items in order; later items cover earlier ones.
    fn render(&mut self, items: &[PickItem]);

    fn read_pixel(&self, x: u32, y: u32) -> Result<[u8; 4], PickError>;

    /// `[width, height]` in pixels.
    fn size(&self) -> [u32; 2];
}

/// CPU render target that splats footprint rectangles.
#[derive(Debug, Clone)]
pub struct IndexBuffer {
    width: u32,
    height: u32,
    pixels: Vec<[u8; 4]>,
}

impl IndexBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0; 4]; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn fill(&mut self, rect: PixelRect, color: [u8; 4]) {
        let x0 = rect.min[0].clamp(0, i64::from(self.width)) as usize;
        let x1 = rect.max[0].clamp(0, i64::from(self.width)) as usize;
        let y0 = rect.min[1].clamp(0, i64::from(self.height)) as usize;
        let y1 = rect.max[1].clamp(0, i64::from(self.height)) as usize;
        let stride = self.width as usize;
        for y in y0..y1 {
            self.pixels[y * stride + x0..y * stride + x1].fill(color);
        }
    }
}

impl IndexRenderTarget for IndexBuffer {
    fn clear(&mut self) {
        self.pixels.fill([0; 4]);
    }

    fn size(&self) -> [u32; 2] {
        [self.width, self.height]
    }

    fn render(&mut self, items: &[PickItem]) {
        for item in items {
            for rect in &item.footprint {
                self.fill(*rect, item.color);
            }
        }
    }

    fn read_pixel(&self, x: u32, y: u32) -> Result<[u8; 4], PickError> {
        if x >= self.width || y >= self.height {
            return Err(PickError::PixelOutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        Ok(self.pixels[y as usize * self.width as usize + x as usize])
    }
}

// ── Footprints ───────────────────────────────────────────────────────────────

/// Target area in pixels, grown by the pick width so elements just past an
/// edge still cover the border.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Clip {
    min: [f64; 2],
    max: [f64; 2],
}

impl Clip {
    fn new(size: [u32; 2], pad: u32) -> Self {
        let pad = f64::from(pad);
        Self {
            min: [-pad, -pad],
            max: [f64::from(size[0]) + pad, f64::from(size[1]) + pad],
        }
    }

    /// Distance from `p` to the area, zero inside.
    fn distance(&self, p: [f64; 2]) -> f64 {
        let dx = (self.min[0] - p[0]).max(p[0] - self.max[0]).max(0.0);
        let dy = (self.min[1] - p[1]).max(p[1] - self.max[1]).max(0.0);
        dx.hypot(dy)
    }

    /// Parameter range of `a + t (b - a)`, `t` in `[0, 1]`, inside the area
    /// (Liang-Barsky).
    fn segment(&self, a: [f64; 2], b: [f64; 2]) -> Option<(f64, f64)> {
        let d = [b[0] - a[0], b[1] - a[1]];
        let (mut t0, mut t1) = (0.0_f64, 1.0_f64);
        for axis in 0..2 {
            for (p, q) in [
                (-d[axis], a[axis] - self.min[axis]),
                (d[axis], self.max[axis] - a[axis]),
            ] {
                if p == 0.0 {
                    if q < 0.0 {
                        return None;
                    }
                    continue;
                }
                let r = q / p;
                if p < 0.0 {
                    t0 = t0.max(r);
                } else {
                    t1 = t1.min(r);
                }
            }
        }
        (t0 <= t1).then_some((t0, t1))
    }
}

/// Maps sketch coordinates to target pixels. Pixel rows grow with +y.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Sketch coordinate shown at pixel (0, 0).
    pub origin: [f64; 2],
    pub pixels_per_unit: f64,
    /// Pick width of points, in pixels.
    pub point_size: u32,
    /// Pick width of curves, in pixels.
    pub line_width: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            origin: [0.0, 0.0],
            pixels_per_unit: 1.0,
            point_size: 7,
            line_width: 3,
        }
    }
}

impl Viewport {
    pub fn to_pixel(&self, p: [f64; 2]) -> [f64; 2] {
        [
            (p[0] - self.origin[0]) * self.pixels_per_unit,
            (p[1] - self.origin[1]) * self.pixels_per_unit,
        ]
    }

    pub fn to_sketch(&self, x: u32, y: u32) -> [f64; 2] {
        [
            f64::from(x) / self.pixels_per_unit + self.origin[0],
            f64::from(y) / self.pixels_per_unit + self.origin[1],
        ]
    }

    fn segment(&self, clip: &Clip, a: [f64; 2], b: [f64; 2], out: &mut Vec<PixelRect>) {
        let (pa, pb) = (self.to_pixel(a), self.to_pixel(b));
        if !pa.iter().chain(&pb).all(|v| v.is_finite()) {
            return;
        }
        let Some((t0, t1)) = clip.segment(pa, pb) else {
            return;
        };
        let d = [pb[0] - pa[0], pb[1] - pa[1]];
        let from = [pa[0] + d[0] * t0, pa[1] + d[1] * t0];
        let to = [pa[0] + d[0] * t1, pa[1] + d[1] * t1];

        let steps = (to[0] - from[0]).abs().max((to[1] - from[1]).abs()).ceil().max(1.0) as usize;
        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            let p = [from[0] + (to[0] - from[0]) * t, from[1] + (to[1] - from[1]) * t];
            out.push(PixelRect::around(p, self.line_width));
        }
    }

    /// Sample an arc about one rect per pixel of visible length. Off-screen
    /// stretches are skipped by their distance to the target.
    fn arc(
        &self,
        clip: &Clip,
        center: [f64; 2],
        radius: f64,
        from: f64,
        sweep: f64,
        out: &mut Vec<PixelRect>,
    ) {
        let c = self.to_pixel(center);
        let r = radius * self.pixels_per_unit;
        let length = (r * sweep).abs();
        if !(length.is_finite() && c[0].is_finite() && c[1].is_finite()) {
            return;
        }
        if clip.distance(c) > r.abs() + f64::from(self.line_width) {
            return;
        }
        let at = |s: f64| {
            let angle = if length > 0.0 { from + sweep * s / length } else { from };
            [c[0] + r * angle.cos(), c[1] + r * angle.sin()]
        };
        if length <= 0.0 {
            out.push(PixelRect::around(at(0.0), self.line_width));
            return;
        }

        let step = (length / 8.0).min(1.0);
        let mut s: f64 = 0.0;
        loop {
            let p = at(s.min(length));
            let gap = clip.distance(p);
            if gap <= 0.0 {
                out.push(PixelRect::around(p, self.line_width));
            }
            if s >= length {
                break;
            }
            s += step.max(gap);
        }
    }
}

fn footprint(
    graph: &EntityGraph,
    data: &EntityData,
    viewport: &Viewport,
    clip: &Clip,
) -> Vec<PixelRect> {
    let at = |id: EntityId| graph.get(id).ok().and_then(|e| e.data.position());
    let mut out = Vec::new();
    match data {
        EntityData::Point2D { .. } => {
            if let Some(p) = data.position() {
                out.push(PixelRect::around(viewport.to_pixel(p), viewport.point_size));
            }
        }
        EntityData::Line2D { p1, p2 } => {
            if let (Some(a), Some(b)) = (at(*p1), at(*p2)) {
                viewport.segment(clip, a, b, &mut out);
            }
        }
        EntityData::Circle { center, radius } => {
            if let Some(c) = at(*center) {
                viewport.arc(clip, c, radius.value, 0.0, std::f64::consts::TAU, &mut out);
            }
        }
        EntityData::Arc {
            center,
            start,
            end,
            invert,
            ..
        } => {
            if let (Some(c), Some(s), Some(e)) = (at(*center), at(*start), at(*end)) {
                let sweep = sketch_solver::primitives::arc_sweep(c, s, e, *invert);
                let from = (s[1] - c[1]).atan2(s[0] - c[0]);
                let radius = (s[0] - c[0]).hypot(s[1] - c[1]);
                let signed = if *invert { -sweep } else { sweep };
                viewport.arc(clip, c, radius, from, signed, &mut out);
            }
        }
        EntityData::Workplane { .. } | EntityData::Sketch { .. } => {}
    }
    out
}

/// Pick items for the visible 2D entities of `sketch` (or of every sketch),
/// clipped to a target of `size` pixels.
///
/// Curves are drawn before points and each group in display order, so a
/// point always wins over the curve it sits on. Curve endpoints are picked
/// as their own point entities; items carry no sub-element here.
pub fn pick_items(
    graph: &EntityGraph,
    sketch: Option<EntityId>,
    viewport: &Viewport,
    size: [u32; 2],
) -> Result<Vec<PickItem>, PickError> {
    let clip = Clip::new(size, viewport.line_width.max(viewport.point_size));
    let mut entities: Vec<_> = graph
        .iter()
        .filter(|e| e.visible && e.kind().is_sketch_scoped())
        .filter(|e| sketch.map_or(true, |s| e.sketch == Some(s)))
        .collect();
    entities.sort_by_key(|e| (e.kind() == EntityKind::Point2D, e.display_index));

    entities
        .into_iter()
        .map(|e| {
            Ok(PickItem {
                hit: PickHit::entity(e.id),
                color: encode(e.id, None)?,
                footprint: footprint(graph, &e.data, viewport, &clip),
            })
        })
        .collect()
}

/// Render the index colors and read back the element under pixel `(x, y)`.
pub fn pick(
    target: &mut dyn IndexRenderTarget,
    graph: &EntityGraph,
    sketch: Option<EntityId>,
    viewport: &Viewport,
    x: u32,
    y: u32,
) -> Result<Option<PickHit>, PickError> {
    let items = pick_items(graph, sketch, viewport, target.size())?;
    target.clear();
    target.render(&items);
    Ok(decode(target.read_pixel(x, y)?))
}
