use super::geometry::Quad;

/// Default vertical tolerance, in pixels, for boxes on the same line.
pub const DEFAULT_LINE_THRESHOLD: f32 = 20.0;

/// Group boxes into reading order: lines top to bottom, boxes left to right.
///
/// Boxes are sorted by the y of their top-left corner; a box joins the
/// current line while it is within `threshold` of the line's first box.
pub fn sort_into_lines<T: AsRef<Quad>>(mut items: Vec<T>, threshold: f32) -> Vec<Vec<T>> {
    items.sort_by(|a, b| a.as_ref().top_left().1.total_cmp(&b.as_ref().top_left().1));

    let mut lines: Vec<Vec<T>> = Vec::new();
    let mut line_y = f32::NEG_INFINITY;
    for item in items {
        let y = item.as_ref().top_left().1;
        match lines.last_mut() {
            Some(line) if (y - line_y).abs() < threshold => line.push(item),
            _ => {
                line_y = y;
                lines.push(vec![item]);
            }
        }
    }

    for line in &mut lines {
        line.sort_by(|a, b| a.as_ref().top_left().0.total_cmp(&b.as_ref().top_left().0));
    }
    lines
}

impl AsRef<Quad> for Quad {
    fn as_ref(&self) -> &Quad {
        self
    }
}
