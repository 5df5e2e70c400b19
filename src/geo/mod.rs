use crate::models::location::Location;

/// Straight-line distance between two coordinates, in degrees.
///
/// Coordinates are treated as points on a flat plane rather than on a
/// sphere; candidate ranking and eviction ordering only need a consistent
/// relative measure, not geodesic accuracy.
pub fn euclidean(a: &Location, b: &Location) -> f64 {
    (a.lat - b.lat).hypot(a.long - b.long)
}
