//! Bar layout around the canvas perimeter
//!
//! Bars run from the bottom centre outwards, round the bottom-left corner, up
//! the left edge, round the top-left corner and back to the top centre. The
//! right half of the canvas is never laid out: the rasteriser mirrors every
//! pixel across the vertical midline. The upper half of the sequence is the
//! lower half reflected across the horizontal midline, so bar `i` and bar
//! `count - 1 - i` are always exact reflections of each other.

use crate::error::WavError;

/// Style parameters that drive the layout, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarStyle {
    pub bar_width: i32,
    pub bar_margin: i32,
    /// Maximum extrusion of a bar into the canvas
    pub bar_height: i32,
    /// Corner radius as a multiple of `bar_height`
    pub roundness: i32,
}

impl BarStyle {
    /// Width of a bar plus the margin on both sides, `None` on overflow
    pub fn footprint(&self) -> Option<i32> {
        self.bar_margin
            .checked_mul(2)
            .and_then(|margins| margins.checked_add(self.bar_width))
    }

    /// Corner radius in pixels, `None` on overflow
    pub fn radius(&self) -> Option<i32> {
        self.roundness.checked_mul(self.bar_height)
    }
}

/// Half-open span `[start, end)` along one canvas axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub start: f32,
    pub end: f32,
}

impl Extent {
    pub fn new(start: f32, end: f32) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> f32 {
        self.end - self.start
    }

    fn reflect(&self, size: f32) -> Self {
        Self::new(size - self.end, size - self.start)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Bottom,
    Left,
    Right,
    Top,
}

impl Edge {
    fn reflected(self) -> Self {
        match self {
            Edge::Bottom => Edge::Top,
            Edge::Top => Edge::Bottom,
            side => side,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    BottomLeft,
    BottomRight,
    TopLeft,
    TopRight,
}

impl Corner {
    fn reflected(self) -> Self {
        match self {
            Corner::BottomLeft => Corner::TopLeft,
            Corner::TopLeft => Corner::BottomLeft,
            Corner::BottomRight => Corner::TopRight,
            Corner::TopRight => Corner::BottomRight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarCategory {
    Straight,
    Skewed,
    Corner,
}

/// One rendered segment of the perimeter.
///
/// `base` is where the bar meets the canvas edge; `top` is where its sides
/// sit once the bar is extruded to the full bar height, which is how skewed
/// and corner bars taper into the rounded corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bar {
    Straight {
        edge: Edge,
        extent: Extent,
    },
    Skewed {
        edge: Edge,
        base: Extent,
        top: Extent,
    },
    /// `start` values are rows on the vertical edge, `end` values are
    /// columns on the horizontal edge.
    Corner {
        corner: Corner,
        base: Extent,
        top: Extent,
    },
}

impl Bar {
    pub fn category(&self) -> BarCategory {
        match self {
            Bar::Straight { .. } => BarCategory::Straight,
            Bar::Skewed { .. } => BarCategory::Skewed,
            Bar::Corner { .. } => BarCategory::Corner,
        }
    }

    /// Reflection across the horizontal midline of a canvas `height` tall
    pub fn mirrored(&self, height: f32) -> Bar {
        match *self {
            Bar::Straight { edge, extent } => match edge {
                Edge::Bottom | Edge::Top => Bar::Straight {
                    edge: edge.reflected(),
                    extent,
                },
                Edge::Left | Edge::Right => Bar::Straight {
                    edge,
                    extent: extent.reflect(height),
                },
            },
            Bar::Skewed { edge, base, top } => match edge {
                Edge::Bottom | Edge::Top => Bar::Skewed {
                    edge: edge.reflected(),
                    base,
                    top,
                },
                Edge::Left | Edge::Right => Bar::Skewed {
                    edge,
                    base: base.reflect(height),
                    top: top.reflect(height),
                },
            },
            Bar::Corner { corner, base, top } => Bar::Corner {
                corner: corner.reflected(),
                base: Extent::new(height - base.start, base.end),
                top: Extent::new(height - top.start, top.end),
            },
        }
    }

    fn straighten_end(&mut self) {
        if let Bar::Skewed { base, top, .. } | Bar::Corner { base, top, .. } = self {
            top.end = base.end;
        }
    }

    fn straighten_start(&mut self) {
        if let Bar::Skewed { base, top, .. } | Bar::Corner { base, top, .. } = self {
            top.start = base.start;
        }
    }
}

/// A complete layout, indexed like the spectrum bands (band `i` drives bar `i`)
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub bars: Vec<Bar>,
    /// Straight bars on the bottom edge (and as many mirrored on the top)
    pub vertical_count: usize,
    /// Tapered bars in the lower-left corner (and as many in the upper-left)
    pub corner_count: usize,
    /// Straight bars on the left edge
    pub horizontal_count: usize,
}

impl Layout {
    /// Bars in the lower half, before the optional middle bar
    pub fn lower_count(&self) -> usize {
        self.vertical_count + self.corner_count + self.horizontal_count / 2
    }

    /// For a bar in the upper half, the index of the lower bar it reflects
    pub fn mirror_source(&self, index: usize) -> Option<usize> {
        let count = self.bars.len();
        (index < count && index >= count - self.lower_count()).then(|| count - 1 - index)
    }
}

/// Lay out bars for a `width` x `height` canvas.
///
/// Odd leftover pixels are absorbed into the margins, so gaps between bars
/// can differ by a pixel.
pub fn layout_bars(width: u32, height: u32, style: &BarStyle) -> Result<Layout, WavError> {
    let infeasible = |reason: String| {
        Err(WavError::LayoutInfeasible(format!(
            "{width}x{height} canvas: {reason}"
        )))
    };

    let BarStyle {
        bar_width,
        bar_margin,
        bar_height,
        roundness,
    } = *style;
    if bar_width <= 0 || bar_height <= 0 || bar_margin < 0 || roundness < 0 {
        return infeasible(format!("unusable bar style {style:?}"));
    }
    let (Ok(w), Ok(h)) = (i32::try_from(width), i32::try_from(height)) else {
        return infeasible("dimensions out of range".into());
    };

    let (Some(footprint), Some(radius)) = (style.footprint(), style.radius()) else {
        return infeasible(format!("bar style {style:?} overflows"));
    };
    if radius > w / 2 {
        return infeasible(format!("narrower than two corner radii ({radius}px each)"));
    }

    let bar_count = w.checked_add(h).map_or(0, |perimeter| perimeter / footprint);
    if bar_count == 0 {
        return infeasible("too small for a single bar".into());
    }

    let mut horizontal = ((h - 2 * radius) / footprint).max(0);
    if horizontal % 2 != bar_count % 2 {
        horizontal += 1;
    }
    let vertical = (w / 2 - radius) / footprint;
    let corner = (bar_count - horizontal) / 2 - vertical;
    if corner < 0 {
        return infeasible(format!("no room for {vertical} bottom bars"));
    }

    let Some(side_span) = footprint.checked_mul(horizontal).filter(|&span| span <= h) else {
        return infeasible(format!("too short for {horizontal} side bars"));
    };

    // leftover spans between the straight runs and the corner
    let corner_x = w / 2 - bar_margin - vertical * footprint;
    let corner_y = (h - side_span) / 2 - bar_margin;
    let run = corner_x + corner_y;
    if corner > 0 && run <= 0 {
        return infeasible(format!("no room for {corner} corner bars"));
    }

    let bw = bar_width as f32;
    let fp = footprint as f32;
    let half_count = (vertical + corner + horizontal / 2) as usize;
    let mut lower = Vec::new();
    let mut bars = Vec::new();
    lower
        .try_reserve_exact(half_count)
        .and_then(|()| bars.try_reserve_exact(bar_count as usize))
        .map_err(|e| WavError::AllocationFailure(format!("bar layout: {e}")))?;

    let mut x = (w / 2 - bar_margin) as f32;
    for _ in 0..vertical {
        lower.push(Bar::Straight {
            edge: Edge::Bottom,
            extent: Extent::new(x - bw, x),
        });
        x -= fp;
    }

    if corner > 0 {
        lay_corner(
            &mut lower,
            corner as usize,
            corner_x as f32,
            run as f32,
            h as f32,
            radius as f32,
            style,
        );
        lower[vertical as usize].straighten_end();
        lower[(vertical + corner - 1) as usize].straighten_start();
    }

    let mut y = (h - corner_y - 2 * bar_margin) as f32;
    for _ in 0..horizontal / 2 {
        lower.push(Bar::Straight {
            edge: Edge::Left,
            extent: Extent::new(y - bw, y),
        });
        y -= fp;
    }

    bars.extend(lower.iter().copied());
    if horizontal % 2 == 1 {
        let start = (h - bar_width) as f32 / 2.0;
        bars.push(Bar::Straight {
            edge: Edge::Left,
            extent: Extent::new(start, start + bw),
        });
    }
    bars.extend(lower.iter().rev().map(|bar| bar.mirrored(h as f32)));
    debug_assert_eq!(bars.len(), bar_count as usize);

    Ok(Layout {
        bars,
        vertical_count: vertical as usize,
        corner_count: corner as usize,
        horizontal_count: horizontal as usize,
    })
}

/// Solve the corner pitch: `count` bars and `count - 1` double margins fill
/// `run` exactly, keeping the straight runs' width:margin ratio.
fn corner_pitch(run: f32, count: usize, style: &BarStyle) -> (f32, f32) {
    if count == 1 {
        return (run, 0.0);
    }
    let n = count as f32;
    let ratio = 2.0 * style.bar_margin as f32 / style.bar_width as f32;
    let width = run / (n + (n - 1.0) * ratio);
    let margin = (run - n * width) / (n - 1.0) / 2.0;
    (width, margin)
}

/// Walk the lower-left corner: along the bottom edge from `start_x` to the
/// corner, then up the left edge, tapering every bar towards the arc centre.
fn lay_corner(
    lower: &mut Vec<Bar>,
    count: usize,
    start_x: f32,
    run: f32,
    height: f32,
    radius: f32,
    style: &BarStyle,
) {
    let (bar_width, margin) = corner_pitch(run, count, style);
    let centre_x = radius;
    let centre_y = height - radius;
    let taper = |value: f32, centre: f32| {
        if radius == 0.0 {
            value
        } else {
            value + (centre - value) * style.bar_height as f32 / radius
        }
    };

    let mut x = start_x;
    let mut y = height;
    let mut along_bottom = true;
    for _ in 0..count {
        if along_bottom {
            let end = x;
            let top_end = taper(end, centre_x);
            x -= bar_width;
            if x < 0.0 {
                // wraps round the corner itself
                y += x;
                lower.push(Bar::Corner {
                    corner: Corner::BottomLeft,
                    base: Extent::new(y, end),
                    top: Extent::new(taper(y, centre_y), top_end),
                });
                along_bottom = false;
                x = 0.0;
                y -= 2.0 * margin;
            } else {
                lower.push(Bar::Skewed {
                    edge: Edge::Bottom,
                    base: Extent::new(x, end),
                    top: Extent::new(taper(x, centre_x), top_end),
                });
                x -= 2.0 * margin;
                if x <= 0.0 {
                    along_bottom = false;
                    y += x;
                    x = 0.0;
                }
            }
        } else {
            let base = Extent::new(y - bar_width, y);
            lower.push(Bar::Skewed {
                edge: Edge::Left,
                base,
                top: Extent::new(taper(base.start, centre_y), taper(base.end, centre_y)),
            });
            y -= bar_width + 2.0 * margin;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style(bar_width: i32, bar_margin: i32, roundness: i32, bar_height: i32) -> BarStyle {
        BarStyle {
            bar_width,
            bar_margin,
            bar_height,
            roundness,
        }
    }

    fn base_and_top(bar: &Bar) -> (Extent, Extent) {
        match *bar {
            Bar::Skewed { base, top, .. } | Bar::Corner { base, top, .. } => (base, top),
            Bar::Straight { extent, .. } => (extent, extent),
        }
    }

    #[test]
    fn test_thin_strip_layout() {
        let layout = layout_bars(800, 40, &style(8, 1, 2, 16)).unwrap();
        let count = layout.bars.len();
        let v = layout.vertical_count;
        let c = layout.corner_count;

        assert_eq!(count, 84);
        assert_eq!(v, 36);
        assert_eq!(c, 6);
        assert_eq!(layout.horizontal_count, 0);

        // the corner runs are straightened where they meet the straight runs
        let (base, top) = base_and_top(&layout.bars[v]);
        assert_eq!(top.end, base.end);
        let (base, top) = base_and_top(&layout.bars[count - 1 - v]);
        assert_eq!(top.end, base.end);
        let (base, top) = base_and_top(&layout.bars[v + c - 1]);
        assert_eq!(top.start, base.start);
        let (base, top) = base_and_top(&layout.bars[count - v - c]);
        assert_eq!(top.end, base.end);

        for i in [v, v + c - 1, count - v - c, count - 1 - v] {
            assert_eq!(layout.bars[i].category(), BarCategory::Skewed);
        }
    }

    #[test]
    fn test_thin_strip_corner_positions() {
        let layout = layout_bars(800, 40, &style(8, 1, 2, 16)).unwrap();

        assert_eq!(
            layout.bars[35],
            Bar::Straight {
                edge: Edge::Bottom,
                extent: Extent::new(41.0, 49.0)
            }
        );
        assert_eq!(
            layout.bars[36],
            Bar::Skewed {
                edge: Edge::Bottom,
                base: Extent::new(31.0, 39.0),
                top: Extent::new(31.5, 39.0),
            }
        );
        // tapered halfway towards the corner centre at x = 32
        assert_eq!(
            layout.bars[37],
            Bar::Skewed {
                edge: Edge::Bottom,
                base: Extent::new(21.0, 29.0),
                top: Extent::new(26.5, 30.5),
            }
        );
        assert_eq!(
            layout.bars[40],
            Bar::Skewed {
                edge: Edge::Left,
                base: Extent::new(31.0, 39.0),
                top: Extent::new(19.5, 23.5),
            }
        );
        // reflection of bar 41, whose top start is pinned at its base
        assert_eq!(
            layout.bars[42],
            Bar::Skewed {
                edge: Edge::Left,
                base: Extent::new(11.0, 19.0),
                top: Extent::new(21.5, 19.0),
            }
        );
    }

    #[test]
    fn test_full_hd_layout() {
        let layout = layout_bars(1920, 1080, &style(8, 1, 2, 16)).unwrap();
        assert_eq!(layout.bars.len(), 300);
        assert_eq!(layout.vertical_count, 92);
        assert_eq!(layout.corner_count, 7);
        assert_eq!(layout.horizontal_count, 102);

        let first_side = 92 + 7;
        assert_eq!(
            layout.bars[first_side],
            Bar::Straight {
                edge: Edge::Left,
                extent: Extent::new(1041.0, 1049.0),
            }
        );
        assert_eq!(
            layout.bars[300 - 1 - first_side],
            Bar::Straight {
                edge: Edge::Left,
                extent: Extent::new(31.0, 39.0),
            }
        );
    }

    #[test]
    fn test_odd_side_count_has_centred_bar() {
        // 151 bars, 45 of them on the left edge
        let layout = layout_bars(1000, 519, &style(8, 1, 2, 16)).unwrap();
        assert_eq!(layout.horizontal_count % 2, 1);

        let middle = layout.bars.len() / 2;
        let bar = layout.bars[middle];
        assert_eq!(bar.mirrored(519.0), bar);
        assert_eq!(
            bar,
            Bar::Straight {
                edge: Edge::Left,
                extent: Extent::new(255.5, 263.5),
            }
        );
    }

    #[test]
    fn test_corner_wedge_at_the_corner() {
        // the fourth corner bar starts half a pixel from x = 0 and wraps
        let layout = layout_bars(808, 40, &style(8, 1, 2, 16)).unwrap();
        assert_eq!(layout.vertical_count, 37);
        assert_eq!(layout.corner_count, 5);

        let wedges: Vec<_> = layout
            .bars
            .iter()
            .enumerate()
            .filter(|(_, bar)| bar.category() == BarCategory::Corner)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(wedges, vec![40, 43]);
        assert!(matches!(
            layout.bars[40],
            Bar::Corner {
                corner: Corner::BottomLeft,
                ..
            }
        ));
        assert!(matches!(
            layout.bars[43],
            Bar::Corner {
                corner: Corner::TopLeft,
                ..
            }
        ));
        assert!(matches!(
            layout.bars[41],
            Bar::Skewed {
                edge: Edge::Left,
                ..
            }
        ));
    }

    #[test]
    fn test_zero_roundness_has_no_taper() {
        let layout = layout_bars(640, 480, &style(8, 1, 0, 16)).unwrap();
        for bar in &layout.bars {
            let (base, top) = base_and_top(bar);
            assert_eq!(base, top);
        }
    }

    #[test]
    fn test_narrow_canvas_is_infeasible() {
        let style = style(8, 1, 2, 16);
        assert!(layout_bars(64, 64, &style).is_ok());
        assert!(matches!(
            layout_bars(63, 63, &style),
            Err(WavError::LayoutInfeasible(_))
        ));
        assert!(matches!(
            layout_bars(40, 800, &style),
            Err(WavError::LayoutInfeasible(_))
        ));
    }

    #[test]
    fn test_unusable_style_is_infeasible() {
        for style in [style(0, 1, 2, 16), style(8, -1, 2, 16), style(8, 1, 2, 0)] {
            assert!(matches!(
                layout_bars(1920, 1080, &style),
                Err(WavError::LayoutInfeasible(_))
            ));
        }
    }

    #[test]
    fn test_oversized_style_is_infeasible() {
        for style in [
            style(8, 1, 100_000, 100_000),
            style(8, i32::MAX / 2, 2, 16),
            style(i32::MAX, 1, 0, 16),
        ] {
            assert!(matches!(
                layout_bars(1920, 1080, &style),
                Err(WavError::LayoutInfeasible(_))
            ));
        }
        assert!(matches!(
            layout_bars(u32::MAX / 2, u32::MAX / 2, &style(8, 1, 2, 16)),
            Err(WavError::LayoutInfeasible(_))
        ));
    }

    #[test]
    fn test_mirror_source_pairs_upper_with_lower_half() {
        let layout = layout_bars(1000, 519, &style(8, 1, 2, 16)).unwrap();
        let count = layout.bars.len();
        let lower = layout.lower_count();
        assert_eq!(count, 2 * lower + 1);

        assert_eq!(layout.mirror_source(0), None);
        assert_eq!(layout.mirror_source(lower), None);
        assert_eq!(layout.mirror_source(lower + 1), Some(lower - 1));
        assert_eq!(layout.mirror_source(count - 1), Some(0));
        assert_eq!(layout.mirror_source(count), None);
    }

    #[test]
    fn test_layout_is_deterministic() {
        let style = style(5, 2, 3, 12);
        assert_eq!(
            layout_bars(1366, 768, &style).unwrap(),
            layout_bars(1366, 768, &style).unwrap()
        );
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn any_style() -> impl Strategy<Value = BarStyle> {
        (1..24i32, 0..6i32, 1..48i32, 0..4i32).prop_map(
            |(bar_width, bar_margin, bar_height, roundness)| BarStyle {
                bar_width,
                bar_margin,
                bar_height,
                roundness,
            },
        )
    }

    proptest! {
        /// Bar `i` and bar `count - 1 - i` reflect each other exactly
        #[test]
        fn layout_is_mirror_symmetric(width in 1..2400u32, height in 1..1400u32, style in any_style()) {
            if let Ok(layout) = layout_bars(width, height, &style) {
                let count = layout.bars.len();
                for i in 0..count.div_ceil(2) {
                    prop_assert_eq!(layout.bars[count - 1 - i], layout.bars[i].mirrored(height as f32));
                }
            }
        }

        /// The sequence covers half the perimeter, one bar per footprint
        #[test]
        fn layout_count_matches_perimeter(width in 1..2400u32, height in 1..1400u32, style in any_style()) {
            if let Ok(layout) = layout_bars(width, height, &style) {
                let expected = (width + height) as usize / style.footprint().unwrap() as usize;
                prop_assert_eq!(layout.bars.len(), expected);
                prop_assert_eq!(
                    layout.bars.len(),
                    2 * (layout.vertical_count + layout.corner_count) + layout.horizontal_count
                );
            }
        }

        /// Feasible layouts never contain empty or inverted straight/skewed bars
        #[test]
        fn layout_extents_are_positive(width in 1..2400u32, height in 1..1400u32, style in any_style()) {
            if let Ok(layout) = layout_bars(width, height, &style) {
                for bar in &layout.bars {
                    match bar {
                        Bar::Straight { extent, .. } => prop_assert!(extent.len() > 0.0),
                        Bar::Skewed { base, .. } => prop_assert!(base.len() > 0.0),
                        Bar::Corner { .. } => {}
                    }
                }
            }
        }

        /// Anything narrower than two corner radii is rejected
        #[test]
        fn narrow_canvas_rejected(height in 1..1400u32, style in any_style()) {
            let radius = style.radius().unwrap();
            prop_assume!(radius > 0);
            let width = (2 * radius - 1) as u32;
            prop_assert!(matches!(
                layout_bars(width, height, &style),
                Err(WavError::LayoutInfeasible(_))
            ));
        }
    }
}
