//! Placement resolution
//!
//! Turns a coordinate spec or keyword hits into validated bottom-left
//! [`PlacementPoint`]s, one per seal to draw.

use seal_types::{Multiplicity, PlacementPoint, Result, SealError, TextLocation};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Parsed `"x,y"` or `"page,x,y"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSpec {
    /// Same point on every target
    Every { x: i64, y: i64 },
    /// One-based target index
    Target { page: usize, x: i64, y: i64 },
}

impl FromStr for CoordinateSpec {
    type Err = SealError;

    fn from_str(input: &str) -> Result<Self> {
        let mut values = Vec::with_capacity(3);
        for part in input.split(',') {
            let part = part.trim();
            let value: i64 = part.parse().map_err(|_| {
                SealError::validation(format!("invalid coordinate {part:?} in {input:?}"))
            })?;
            values.push(value);
        }
        match values.as_slice() {
            [x, y] => Ok(CoordinateSpec::Every { x: *x, y: *y }),
            [page, x, y] => {
                let page = usize::try_from(*page)
                    .ok()
                    .filter(|p| *p >= 1)
                    .ok_or_else(|| SealError::validation(format!("page must be 1 or more, got {page}")))?;
                Ok(CoordinateSpec::Target { page, x: *x, y: *y })
            }
            _ => Err(SealError::validation(format!(
                "coordinate spec {input:?} must be \"x,y\" or \"page,x,y\""
            ))),
        }
    }
}

impl fmt::Display for CoordinateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinateSpec::Every { x, y } => write!(f, "{x},{y}"),
            CoordinateSpec::Target { page, x, y } => write!(f, "{page},{x},{y}"),
        }
    }
}

impl CoordinateSpec {
    /// Placements for targets of the given `(width, height)` sizes.
    ///
    /// A page number past the last target applies the point to every target.
    pub fn resolve(&self, sizes: &[(f64, f64)]) -> Result<Vec<PlacementPoint>> {
        let (only, x, y) = match *self {
            CoordinateSpec::Every { x, y } => (None, x, y),
            CoordinateSpec::Target { page, x, y } if page <= sizes.len() => (Some(page - 1), x, y),
            CoordinateSpec::Target { x, y, .. } => (None, x, y),
        };
        let (x, y) = (x as f64, y as f64);
        let points = match only {
            Some(index) => {
                let (w, h) = sizes[index];
                vec![PlacementPoint::checked(index, x, y, w, h)?]
            }
            None => sizes
                .iter()
                .enumerate()
                .map(|(index, &(w, h))| PlacementPoint::checked(index, x, y, w, h))
                .collect::<Result<_>>()?,
        };
        debug!(spec = %self, placements = points.len(), "resolved coordinate spec");
        Ok(points)
    }
}

/// Apply the multiplicity policy to hits in document order.
pub fn select_matches(hits: Vec<TextLocation>, multiplicity: Multiplicity) -> Result<Vec<TextLocation>> {
    if hits.is_empty() {
        return Err(SealError::NotFound("keyword has no matches".into()));
    }
    match multiplicity {
        Multiplicity::Last => Ok(hits.into_iter().last().into_iter().collect()),
        Multiplicity::ExactlyOne if hits.len() > 1 => Err(SealError::validation(format!(
            "keyword matched {} times, exactly one match is required",
            hits.len()
        ))),
        Multiplicity::ExactlyOne | Multiplicity::Every => Ok(hits),
    }
}

/// Selected keyword hits as validated placements.
pub fn resolve_keyword(
    hits: Vec<TextLocation>,
    sizes: &[(f64, f64)],
    multiplicity: Multiplicity,
) -> Result<Vec<PlacementPoint>> {
    select_matches(hits, multiplicity)?
        .into_iter()
        .map(|hit| {
            let &(w, h) = sizes.get(hit.target).ok_or_else(|| {
                SealError::Geometry(format!("match on missing target {}", hit.target + 1))
            })?;
            let hit = hit.to_bottom_left(h);
            PlacementPoint::checked(hit.target, hit.x, hit.y, w, h)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use seal_types::ErrorKind;

    const LETTER: (f64, f64) = (612.0, 792.0);

    fn point(target: usize, x: f64, y: f64) -> PlacementPoint {
        PlacementPoint { target, x, y }
    }

    #[test]
    fn test_parse_with_whitespace() {
        assert_eq!(" 2 , 100,200 ".parse::<CoordinateSpec>().unwrap(), CoordinateSpec::Target {
            page: 2,
            x: 100,
            y: 200
        });
        assert_eq!("10,20".parse::<CoordinateSpec>().unwrap(), CoordinateSpec::Every { x: 10, y: 20 });
    }

    #[test]
    fn test_parse_rejects() {
        for bad in ["", "1", "1,2,3,4", "a,b", "1.5,2", "0,10,10", "-1,10,10"] {
            let err = bad.parse::<CoordinateSpec>().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{bad}");
        }
    }

    #[test]
    fn test_resolve_single_page() {
        let spec: CoordinateSpec = "2,100,200".parse().unwrap();
        let points = spec.resolve(&[LETTER, LETTER, LETTER]).unwrap();
        assert_eq!(points, vec![point(1, 100.0, 200.0)]);
    }

    #[test]
    fn test_resolve_every_target() {
        let spec: CoordinateSpec = "50,60".parse().unwrap();
        let points = spec.resolve(&[LETTER, (100.0, 100.0)]).unwrap();
        assert_eq!(points, vec![point(0, 50.0, 60.0), point(1, 50.0, 60.0)]);
    }

    #[test]
    fn test_page_past_end_means_every() {
        let spec: CoordinateSpec = "9,10,10".parse().unwrap();
        assert_eq!(spec.resolve(&[LETTER, LETTER]).unwrap().len(), 2);
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let spec: CoordinateSpec = "1,612,792".parse().unwrap();
        assert!(spec.resolve(&[LETTER]).is_ok());
        let spec: CoordinateSpec = "1,613,10".parse().unwrap();
        assert_eq!(spec.resolve(&[LETTER]).unwrap_err().kind(), ErrorKind::Geometry);
        let spec: CoordinateSpec = "10,-1".parse().unwrap();
        assert_eq!(spec.resolve(&[LETTER]).unwrap_err().kind(), ErrorKind::Geometry);
    }

    #[test]
    fn test_every_target_checks_each_size() {
        let spec: CoordinateSpec = "500,500".parse().unwrap();
        let err = spec.resolve(&[LETTER, (400.0, 400.0)]).unwrap_err();
        assert!(err.to_string().contains("target 2"));
    }

    fn hits(n: usize) -> Vec<TextLocation> {
        (0..n).map(|i| TextLocation::bottom_left(0, 10.0 * i as f64, 100.0)).collect()
    }

    #[test]
    fn test_multiplicity_policies() {
        let last = select_matches(hits(3), Multiplicity::Last).unwrap();
        assert_eq!(last, vec![TextLocation::bottom_left(0, 20.0, 100.0)]);

        let err = select_matches(hits(2), Multiplicity::ExactlyOne).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(select_matches(hits(1), Multiplicity::ExactlyOne).unwrap().len(), 1);

        assert_eq!(select_matches(hits(3), Multiplicity::Every).unwrap(), hits(3));
        assert_eq!(select_matches(vec![], Multiplicity::Every).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_ocr_hit_is_flipped_once() {
        let points = resolve_keyword(
            vec![TextLocation::top_left(0, 300.0, 450.0)],
            &[(1000.0, 1400.0)],
            Multiplicity::Last,
        )
        .unwrap();
        assert_eq!(points, vec![point(0, 300.0, 950.0)]);
    }

    #[test]
    fn test_hit_on_unknown_target() {
        let err = resolve_keyword(
            vec![TextLocation::bottom_left(3, 1.0, 1.0)],
            &[LETTER],
            Multiplicity::Last,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Geometry);
    }
}
