//! Coverage path planning over a geofenced search area.
//!
//! Generators work in degrees with a flat-earth spacing conversion, clip
//! every candidate to the area polygon, and the result is thinned so that
//! consecutive waypoints are at least [`MIN_WAYPOINT_DISTANCE_M`] apart.
//! Spacing is widened whenever a pattern would otherwise evaluate more than
//! [`MAX_CANDIDATE_POINTS`] candidates.

use crate::pipeline::bus::category;
use crate::pipeline::caps::{media, Caps};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::factory::templates;
use crate::pipeline::node::{Node, NodeContext, NodeCore};
use crate::pipeline::packet::{WaypointList, WirePacket};
use crate::pipeline::pad::Pad;
use crate::pipeline::params::{
    GeoPoint, NodeParams, ParamError, SearchArea, SearchParams, SearchPattern, SearchPlannerParams,
};
use std::f64::consts::PI;

pub const WAYPOINTS_OUT: &str = "waypoints";

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
pub const MIN_WAYPOINT_DISTANCE_M: f64 = 5.0;
/// Used when the configured spacing is not positive.
const FALLBACK_SPACING_M: f64 = 50.0;
const METERS_PER_DEGREE: f64 = 111_000.0;
const SECTOR_COUNT: u32 = 8;
const POINTS_PER_SECTOR: u32 = 10;
/// Upper bound on the candidates one spacing-driven pattern evaluates.
pub const MAX_CANDIDATE_POINTS: f64 = 100_000.0;

// ── Geometry ──

#[derive(Debug, Clone, Copy)]
struct Bounds {
    min_lat: f64,
    max_lat: f64,
    min_lon: f64,
    max_lon: f64,
}

impl Bounds {
    fn of(polygon: &[GeoPoint]) -> Option<Self> {
        let first = polygon.first()?;
        let mut b = Bounds {
            min_lat: first.lat,
            max_lat: first.lat,
            min_lon: first.lon,
            max_lon: first.lon,
        };
        for p in polygon {
            b.min_lat = b.min_lat.min(p.lat);
            b.max_lat = b.max_lat.max(p.lat);
            b.min_lon = b.min_lon.min(p.lon);
            b.max_lon = b.max_lon.max(p.lon);
        }
        Some(b)
    }

    fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    fn max_radius(&self) -> f64 {
        ((self.max_lat - self.min_lat) / 2.0).max((self.max_lon - self.min_lon) / 2.0)
    }
}

/// Degrees of latitude and longitude covering `spacing_m` around `lat`.
fn degree_spacing(spacing_m: f64, lat: f64) -> (f64, f64) {
    let spacing = positive_spacing(spacing_m);
    let lat_step = spacing / METERS_PER_DEGREE;
    let lon_step = spacing / (METERS_PER_DEGREE * lat.to_radians().cos());
    (lat_step, lon_step)
}

fn positive_spacing(spacing_m: f64) -> f64 {
    if spacing_m > 0.0 {
        spacing_m
    } else {
        FALLBACK_SPACING_M
    }
}

/// Candidates `pattern` evaluates over `b` at `spacing_m`.
fn candidate_count(pattern: SearchPattern, b: &Bounds, spacing_m: f64) -> f64 {
    let (lat_step, lon_step) = degree_spacing(spacing_m, b.center().0);
    let rows = (b.max_lat - b.min_lat) / lat_step + 1.0;
    match pattern {
        SearchPattern::LawnMower => rows * ((b.max_lon - b.min_lon) / lon_step + 1.0),
        SearchPattern::Zigzag => rows,
        SearchPattern::Spiral => b.max_radius() / lat_step * 16.0 + 1.0,
        SearchPattern::Sector | SearchPattern::WaypointList => 0.0,
    }
}

/// Configured spacing, doubled until the pattern fits under
/// [`MAX_CANDIDATE_POINTS`].
fn bounded_spacing(pattern: SearchPattern, b: &Bounds, spacing_m: f64) -> f64 {
    let mut spacing = positive_spacing(spacing_m);
    while candidate_count(pattern, b, spacing) > MAX_CANDIDATE_POINTS {
        spacing *= 2.0;
    }
    spacing
}

/// The spacing planning will actually use, when it differs from the
/// configured one because the area is too large for it.
pub fn widened_spacing(params: &SearchPlannerParams) -> Option<f64> {
    let polygon = &params.search_area.polygon;
    let b = Bounds::of(polygon).filter(|_| polygon.len() >= 3)?;
    let sp = &params.search_params;
    let used = bounded_spacing(sp.pattern, &b, sp.spacing);
    (used > positive_spacing(sp.spacing)).then_some(used)
}

/// Even-odd ray cast. Polygons with fewer than three vertices contain nothing.
pub fn point_in_polygon(point: &GeoPoint, polygon: &[GeoPoint]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    for (i, p1) in polygon.iter().enumerate() {
        let p2 = &polygon[(i + 1) % polygon.len()];
        if (p1.lat > point.lat) != (p2.lat > point.lat) {
            let cross_lon = (p2.lon - p1.lon) * (point.lat - p1.lat) / (p2.lat - p1.lat) + p1.lon;
            if point.lon < cross_lon {
                inside = !inside;
            }
        }
    }
    inside
}

/// Great-circle distance in metres.
pub fn haversine_distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Drop every waypoint closer than [`MIN_WAYPOINT_DISTANCE_M`] to the last one kept.
pub fn optimize_path(waypoints: Vec<GeoPoint>) -> Vec<GeoPoint> {
    let mut kept: Vec<GeoPoint> = Vec::with_capacity(waypoints.len());
    for p in waypoints {
        match kept.last() {
            Some(last) if haversine_distance(last, &p) < MIN_WAYPOINT_DISTANCE_M => {}
            _ => kept.push(p),
        }
    }
    kept
}

// ── Patterns ──

/// Serpentine rows over the polygon's bounding grid.
pub fn lawn_mower_path(area: &SearchArea, params: &SearchParams) -> Vec<GeoPoint> {
    let Some(b) = Bounds::of(&area.polygon).filter(|_| area.polygon.len() >= 3) else {
        return Vec::new();
    };
    let spacing = bounded_spacing(SearchPattern::LawnMower, &b, params.spacing);
    let (lat_step, lon_step) = degree_spacing(spacing, b.center().0);

    let mut path = Vec::new();
    let mut row = 0u32;
    loop {
        let lat = b.min_lat + row as f64 * lat_step;
        if lat > b.max_lat {
            break;
        }
        let mut points = Vec::new();
        let mut col = 0u32;
        loop {
            let lon = b.min_lon + col as f64 * lon_step;
            if lon > b.max_lon {
                break;
            }
            let p = GeoPoint::new(lat, lon, params.altitude);
            if point_in_polygon(&p, &area.polygon) {
                points.push(p);
            }
            col += 1;
        }
        if row % 2 == 1 {
            points.reverse();
        }
        path.extend(points);
        row += 1;
    }
    path
}

/// Archimedean spiral out from the area center, 16 points per turn.
pub fn spiral_path(area: &SearchArea, params: &SearchParams) -> Vec<GeoPoint> {
    let Some(b) = Bounds::of(&area.polygon).filter(|_| area.polygon.len() >= 3) else {
        return Vec::new();
    };
    let (center_lat, center_lon) = b.center();
    let max_radius = b.max_radius();
    let spacing = bounded_spacing(SearchPattern::Spiral, &b, params.spacing);
    let (lat_step, _) = degree_spacing(spacing, center_lat);
    let turns = (max_radius / lat_step) as u32;

    let mut path = Vec::new();
    for i in 0..=turns * 16 {
        let angle = i as f64 * PI / 8.0;
        let radius = (i as f64 / 16.0) * lat_step;
        if radius > max_radius {
            break;
        }
        let p = GeoPoint::new(
            center_lat + radius * angle.cos(),
            center_lon + radius * angle.sin(),
            params.altitude,
        );
        if point_in_polygon(&p, &area.polygon) {
            path.push(p);
        }
    }
    path
}

/// Diagonal sweep north, bouncing between the east and west edges.
pub fn zigzag_path(area: &SearchArea, params: &SearchParams) -> Vec<GeoPoint> {
    let Some(b) = Bounds::of(&area.polygon).filter(|_| area.polygon.len() >= 3) else {
        return Vec::new();
    };
    let spacing = bounded_spacing(SearchPattern::Zigzag, &b, params.spacing);
    let (lat_step, lon_step) = degree_spacing(spacing, b.center().0);

    let mut path = Vec::new();
    let mut eastward = true;
    let (mut lat, mut lon) = (b.min_lat, b.min_lon);
    while lat <= b.max_lat && lon <= b.max_lon {
        let p = GeoPoint::new(lat, lon, params.altitude);
        if point_in_polygon(&p, &area.polygon) {
            path.push(p);
        }
        lat += lat_step;
        if eastward {
            lon += lon_step;
            if lon > b.max_lon {
                lon = b.max_lon;
                eastward = false;
            }
        } else {
            lon -= lon_step;
            if lon < b.min_lon {
                lon = b.min_lon;
                eastward = true;
            }
        }
    }
    path
}

/// Eight radial legs from the center, each sweeping across its sector.
pub fn sector_path(area: &SearchArea, params: &SearchParams) -> Vec<GeoPoint> {
    let Some(b) = Bounds::of(&area.polygon).filter(|_| area.polygon.len() >= 3) else {
        return Vec::new();
    };
    let (center_lat, center_lon) = b.center();
    let max_radius = b.max_radius();
    let sector_width = 2.0 * PI / SECTOR_COUNT as f64;

    let mut path = Vec::new();
    for sector in 0..SECTOR_COUNT {
        let start = sector as f64 * sector_width;
        for i in 0..=POINTS_PER_SECTOR {
            let t = i as f64 / POINTS_PER_SECTOR as f64;
            let radius = t * max_radius;
            let angle = start + sector_width * t;
            let p = GeoPoint::new(
                center_lat + radius * angle.cos(),
                center_lon + radius * angle.sin(),
                params.altitude,
            );
            if point_in_polygon(&p, &area.polygon) {
                path.push(p);
            }
        }
    }
    path
}

/// Full route for the configured pattern, thinned.
pub fn plan_search_path(params: &SearchPlannerParams) -> Vec<GeoPoint> {
    let area = &params.search_area;
    let sp = &params.search_params;
    let raw = match sp.pattern {
        SearchPattern::LawnMower => lawn_mower_path(area, sp),
        SearchPattern::Spiral => spiral_path(area, sp),
        SearchPattern::Zigzag => zigzag_path(area, sp),
        SearchPattern::Sector => sector_path(area, sp),
        SearchPattern::WaypointList => params.waypoints.clone(),
    };
    optimize_path(raw)
}

// ── Node ──

/// Plans on start and publishes the route once.
pub struct SearchPathPlannerNode {
    core: NodeCore,
    params: SearchPlannerParams,
    waypoints: Vec<GeoPoint>,
    published: bool,
}

impl SearchPathPlannerNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            core: NodeCore::new(id, templates::SEARCH_PATH_PLANNER)
                .with_pad(Pad::source(WAYPOINTS_OUT, Caps::media(media::WAYPOINTS))),
            params: SearchPlannerParams::default(),
            waypoints: Vec::new(),
            published: false,
        }
    }

    pub fn params(&self) -> &SearchPlannerParams {
        &self.params
    }

    pub fn set_search_area(&mut self, area: SearchArea) {
        self.params.search_area = area;
    }

    pub fn set_search_params(&mut self, params: SearchParams) {
        self.params.search_params = params;
    }

    /// Route computed by the last start.
    pub fn waypoints(&self) -> &[GeoPoint] {
        &self.waypoints
    }
}

impl Node for SearchPathPlannerNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn on_configure(&mut self, params: &NodeParams) -> Result<(), ParamError> {
        match params {
            NodeParams::SearchPlanner(p) => {
                self.params = p.clone();
                Ok(())
            }
            NodeParams::None => Ok(()),
            _ => Err(ParamError::Mismatch {
                expected: "search_path_planner",
            }),
        }
    }

    fn on_start(&mut self, ctx: &mut NodeContext) -> PipelineResult<()> {
        if let Some(spacing) = widened_spacing(&self.params) {
            ctx.post(
                category::CONFIG,
                format!(
                    "{}: spacing {} m would exceed {} candidate points over this area, using {} m",
                    self.core.id(),
                    self.params.search_params.spacing,
                    MAX_CANDIDATE_POINTS,
                    spacing
                ),
            );
        }
        self.waypoints = plan_search_path(&self.params);
        self.published = false;
        if self.waypoints.is_empty() {
            ctx.post(
                category::NODE,
                format!("{}: search pattern produced no waypoints", self.core.id()),
            );
        } else {
            tracing::info!(
                "{}: planned {} waypoints ({:?}, spacing {} m)",
                self.core.id(),
                self.waypoints.len(),
                self.params.search_params.pattern,
                self.params.search_params.spacing
            );
        }
        Ok(())
    }

    fn on_process(&mut self, _ctx: &mut NodeContext) {
        if self.published {
            return;
        }
        let packet = WaypointList(self.waypoints.clone());
        self.core.push(WAYPOINTS_OUT, &packet.encode());
        self.published = true;
    }
}
