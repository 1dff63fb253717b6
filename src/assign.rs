use crate::error::{AssignError, GeometryError};
use crate::types::{is_blank, RecordId, ReferenceArea, TargetRecord};
use geo::algorithm::bool_ops::BooleanOps;
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::coordinate_position::{CoordPos, CoordinatePosition};
use geo::algorithm::relate::Relate;
use geo::{Geometry, LineString, MultiPolygon, Polygon, Rect};
use rstar::{RTree, RTreeObject, AABB};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::debug;

/// All reference polygons sharing one code, merged into a single region.
#[derive(Debug, Clone)]
pub struct CombinedRegion {
    pub code: String,
    pub region: MultiPolygon<f64>,
}

// Bounding box of a combined region, pointing back into `AreaIndex::regions`
struct RegionEnvelope {
    slot: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for RegionEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Reference areas grouped by code, with an R-tree over the region
/// bounding boxes. Built once and read-only afterwards, so one index can
/// serve any number of batches, including parallel ones.
pub struct AreaIndex {
    regions: Vec<CombinedRegion>,
    by_code: HashMap<String, usize>,
    tree: RTree<RegionEnvelope>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reason {
    NoEnclosingArea,
    /// Candidates are sorted and distinct.
    Ambiguous { candidates: Vec<String> },
    DeclaredAreaMismatch { declared: String },
    InvalidGeometry(GeometryError),
}

impl Reason {
    pub fn label(&self) -> &'static str {
        match self {
            Reason::NoEnclosingArea => "no enclosing area",
            Reason::Ambiguous { .. } => "ambiguous",
            Reason::DeclaredAreaMismatch { .. } => "declared area mismatch",
            Reason::InvalidGeometry(_) => "invalid geometry",
        }
    }

    pub fn candidates(&self) -> &[String] {
        match self {
            Reason::Ambiguous { candidates } => candidates.as_slice(),
            _ => &[],
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportEntry {
    pub record: RecordId,
    pub reason: Reason,
}

impl AreaIndex {
    pub fn build(reference_areas: &[ReferenceArea]) -> Result<Self, AssignError> {
        if reference_areas.is_empty() {
            return Err(AssignError::NoReferenceAreas);
        }

        let mut grouped: BTreeMap<&str, Vec<&Polygon<f64>>> = BTreeMap::new();
        for (index, area) in reference_areas.iter().enumerate() {
            if is_blank(&area.code) {
                return Err(AssignError::BlankReferenceCode { index });
            }
            grouped
                .entry(area.code.as_str())
                .or_default()
                .extend(area.geometry.iter());
        }

        let regions: Vec<CombinedRegion> = grouped
            .into_iter()
            .map(|(code, parts)| CombinedRegion {
                code: code.to_string(),
                region: union_all(parts),
            })
            .collect();

        let by_code = regions
            .iter()
            .enumerate()
            .map(|(slot, r)| (r.code.clone(), slot))
            .collect();

        // Regions without any polygon have no extent and can never enclose anything
        let envelopes: Vec<RegionEnvelope> = regions
            .iter()
            .enumerate()
            .filter_map(|(slot, r)| {
                r.region.bounding_rect().map(|rect| RegionEnvelope {
                    slot,
                    aabb: to_aabb(&rect),
                })
            })
            .collect();

        debug!(
            "Grouped {} reference polygons into {} regions",
            reference_areas.len(),
            regions.len()
        );

        Ok(AreaIndex {
            regions,
            by_code,
            tree: RTree::bulk_load(envelopes),
        })
    }

    pub fn regions(&self) -> &[CombinedRegion] {
        &self.regions
    }

    pub fn region(&self, code: &str) -> Option<&MultiPolygon<f64>> {
        self.by_code.get(code).map(|&slot| &self.regions[slot].region)
    }

    /// Sorted codes of every region covering `geometry`, boundary included.
    pub fn enclosing_codes(&self, geometry: &Geometry<f64>) -> Vec<&str> {
        let Some(rect) = geometry.bounding_rect() else {
            return Vec::new();
        };

        let mut codes: Vec<&str> = self
            .tree
            .locate_in_envelope_intersecting(&to_aabb(&rect))
            .map(|envelope| &self.regions[envelope.slot])
            .filter(|r| covers(&r.region, geometry))
            .map(|r| r.code.as_str())
            .collect();
        codes.sort_unstable();
        codes
    }

    /// Fill in the code of every unassigned record. Records that already
    /// carry a code are only checked against their declared region.
    pub fn assign(&self, mut records: Vec<TargetRecord>) -> (Vec<TargetRecord>, Vec<ReportEntry>) {
        let mut report = Vec::new();
        let mut assigned = 0usize;

        for record in records.iter_mut() {
            let was_unassigned = record.declared_code().is_none();
            match self.resolve(record) {
                Some(reason) => report.push(ReportEntry {
                    record: record.id,
                    reason,
                }),
                None if was_unassigned => assigned += 1,
                None => {}
            }
        }

        debug!(
            "Assigned {} of {} records, {} report entries",
            assigned,
            records.len(),
            report.len()
        );

        (records, report)
    }

    fn resolve(&self, record: &mut TargetRecord) -> Option<Reason> {
        if record.declared_code().is_none() {
            record.area_code = None;
        }

        let geometry = match validate(record.geometry.as_ref()) {
            Ok(geometry) => geometry,
            Err(e) => return Some(Reason::InvalidGeometry(e)),
        };

        if let Some(declared) = record.declared_code() {
            return match self.region(declared) {
                Some(region) if covers(region, geometry) => None,
                _ => Some(Reason::DeclaredAreaMismatch {
                    declared: declared.to_string(),
                }),
            };
        }

        let codes = self.enclosing_codes(geometry);
        match codes.as_slice() {
            [] => Some(Reason::NoEnclosingArea),
            [code] => {
                record.area_code = Some(code.to_string());
                None
            }
            _ => Some(Reason::Ambiguous {
                candidates: codes.iter().map(|c| c.to_string()).collect(),
            }),
        }
    }
}

/// Group `reference_areas` and impute the area code of every target
/// record lacking one. Only configuration problems are errors; all other
/// outcomes land in the report, in input order.
pub fn assign_missing_areas(
    reference_areas: &[ReferenceArea],
    target_records: Vec<TargetRecord>,
) -> Result<(Vec<TargetRecord>, Vec<ReportEntry>), AssignError> {
    let index = AreaIndex::build(reference_areas)?;
    Ok(index.assign(target_records))
}

fn union_all(parts: Vec<&Polygon<f64>>) -> MultiPolygon<f64> {
    match parts.as_slice() {
        [single] => MultiPolygon::new(vec![(*single).clone()]),
        _ => parts.into_iter().fold(MultiPolygon::new(vec![]), |acc, part| {
            acc.union(&MultiPolygon::new(vec![part.clone()]))
        }),
    }
}

fn covers(region: &MultiPolygon<f64>, geometry: &Geometry<f64>) -> bool {
    match geometry {
        Geometry::Point(point) => region.coordinate_position(&point.0) != CoordPos::Outside,
        Geometry::Polygon(polygon) => region.relate(polygon).is_covers(),
        Geometry::MultiPolygon(multi) => region.relate(multi).is_covers(),
        _ => false,
    }
}

fn to_aabb(rect: &Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

fn validate(geometry: Option<&Geometry<f64>>) -> Result<&Geometry<f64>, GeometryError> {
    let geometry = geometry.ok_or(GeometryError::Missing)?;
    match geometry {
        Geometry::Point(point) => {
            if !(point.x().is_finite() && point.y().is_finite()) {
                return Err(GeometryError::NonFinite);
            }
        }
        Geometry::Polygon(polygon) => check_polygon(polygon)?,
        Geometry::MultiPolygon(multi) => {
            if multi.0.is_empty() {
                return Err(GeometryError::Empty);
            }
            for polygon in multi.iter() {
                check_polygon(polygon)?;
            }
        }
        Geometry::Line(_) => return Err(GeometryError::Unsupported("Line")),
        Geometry::LineString(_) => return Err(GeometryError::Unsupported("LineString")),
        Geometry::MultiPoint(_) => return Err(GeometryError::Unsupported("MultiPoint")),
        Geometry::MultiLineString(_) => {
            return Err(GeometryError::Unsupported("MultiLineString"))
        }
        Geometry::GeometryCollection(_) => {
            return Err(GeometryError::Unsupported("GeometryCollection"))
        }
        Geometry::Rect(_) => return Err(GeometryError::Unsupported("Rect")),
        Geometry::Triangle(_) => return Err(GeometryError::Unsupported("Triangle")),
    }
    Ok(geometry)
}

fn check_polygon(polygon: &Polygon<f64>) -> Result<(), GeometryError> {
    check_ring(polygon.exterior())?;
    polygon.interiors().iter().try_for_each(check_ring)
}

fn check_ring(ring: &LineString<f64>) -> Result<(), GeometryError> {
    if ring.0.is_empty() {
        return Err(GeometryError::Empty);
    }
    if ring.coords().any(|c| !(c.x.is_finite() && c.y.is_finite())) {
        return Err(GeometryError::NonFinite);
    }
    if ring.0.len() < 4 || !ring.is_closed() {
        return Err(GeometryError::InvalidRing);
    }
    Ok(())
}
