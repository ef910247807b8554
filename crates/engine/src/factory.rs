//! Placement operations. Each one appends exactly one record at the pointer.
//!
//! Dimension input is never rejected here: numeric fields that are missing,
//! non-numeric or below 1 fall back to the kind's default.

use crate::error::PlacementError;
use crate::images::ResidentRequest;
use crate::model::{defaults, PlacedObject};
use crate::world::{RoadDraft, World};
use hamlet_protocol::{PlaceKind, PlaceRequest, Point, RawField};

/// Coerce a user-typed dimension to a positive integer. Decimals truncate.
pub fn coerce_dimension(raw: Option<&RawField>, default: u32) -> u32 {
    raw.and_then(RawField::as_number)
        .filter(|n| n.is_finite() && *n >= 1.0)
        .map(|n| n.min(u32::MAX as f64) as u32)
        .unwrap_or(default)
}

/// Non-empty text or the default.
pub fn coerce_name(raw: Option<&RawField>, default: &str) -> String {
    match raw.and_then(RawField::as_text) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => default.to_string(),
    }
}

impl World {
    pub fn create_foundation(
        &mut self,
        at: Point,
        width: Option<&RawField>,
        height: Option<&RawField>,
    ) -> usize {
        self.push_object(PlacedObject::Foundation {
            x: at.x,
            y: at.y,
            width: coerce_dimension(width, defaults::FOUNDATION_WIDTH),
            height: coerce_dimension(height, defaults::FOUNDATION_HEIGHT),
        })
    }

    pub fn create_wheel(&mut self, at: Point, radius: Option<&RawField>) -> usize {
        self.push_object(PlacedObject::Wheel {
            x: at.x,
            y: at.y,
            radius: coerce_dimension(radius, defaults::WHEEL_RADIUS),
        })
    }

    pub fn create_house(
        &mut self,
        at: Point,
        width: Option<&RawField>,
        height: Option<&RawField>,
    ) -> usize {
        self.push_object(PlacedObject::House {
            x: at.x,
            y: at.y,
            width: coerce_dimension(width, defaults::HOUSE_WIDTH),
            height: coerce_dimension(height, defaults::HOUSE_HEIGHT),
        })
    }

    pub fn create_company(
        &mut self,
        at: Point,
        name: Option<&RawField>,
        width: Option<&RawField>,
        height: Option<&RawField>,
    ) -> usize {
        self.push_object(PlacedObject::Company {
            x: at.x,
            y: at.y,
            width: coerce_dimension(width, defaults::COMPANY_WIDTH),
            height: coerce_dimension(height, defaults::COMPANY_HEIGHT),
            name: coerce_name(name, defaults::COMPANY_NAME),
        })
    }

    /// Straight road running right from the pointer.
    pub fn create_road(&mut self, at: Point, length: Option<&RawField>) -> usize {
        self.push_straight_road(at, length, false)
    }

    pub fn create_highway(&mut self, at: Point, length: Option<&RawField>) -> usize {
        self.push_straight_road(at, length, true)
    }

    fn push_straight_road(&mut self, at: Point, length: Option<&RawField>, highway: bool) -> usize {
        let length = coerce_dimension(length, defaults::ROAD_LENGTH) as f64;
        self.push_object(PlacedObject::Road {
            points: vec![at, Point::new(at.x + length, at.y)],
            highway,
        })
    }

    pub fn create_car(
        &mut self,
        at: Point,
        width: Option<&RawField>,
        height: Option<&RawField>,
        speed: Option<&RawField>,
    ) -> usize {
        self.push_object(PlacedObject::Car {
            x: at.x,
            y: at.y,
            width: coerce_dimension(width, defaults::CAR_WIDTH),
            height: coerce_dimension(height, defaults::CAR_HEIGHT),
            speed: coerce_dimension(speed, defaults::CAR_SPEED),
        })
    }

    /// Dispatch a dashboard placement request. Returns the new object's index.
    pub fn place(&mut self, req: &PlaceRequest) -> usize {
        let at = Point::new(req.x, req.y);
        match req.kind {
            PlaceKind::Foundation => self.create_foundation(at, req.width.as_ref(), req.height.as_ref()),
            PlaceKind::Wheel => self.create_wheel(at, req.radius.as_ref()),
            PlaceKind::House => self.create_house(at, req.width.as_ref(), req.height.as_ref()),
            PlaceKind::Company => self.create_company(
                at,
                req.name.as_ref(),
                req.width.as_ref(),
                req.height.as_ref(),
            ),
            PlaceKind::Road => self.create_road(at, req.length.as_ref()),
            PlaceKind::Highway => self.create_highway(at, req.length.as_ref()),
            PlaceKind::Car => self.create_car(
                at,
                req.width.as_ref(),
                req.height.as_ref(),
                req.speed.as_ref(),
            ),
        }
    }

    /// Start a resident. Nothing is appended until the returned request has
    /// been decoded and its arrival drained.
    pub fn request_resident(
        &self,
        at: Point,
        name: Option<&RawField>,
        image: Option<Vec<u8>>,
    ) -> Result<ResidentRequest, PlacementError> {
        // JSON has no encoding for NaN/inf, so such a resident could never be reloaded.
        if !(at.x.is_finite() && at.y.is_finite()) {
            return Err(PlacementError::InvalidPointer { x: at.x, y: at.y });
        }
        let bytes = image
            .filter(|b| !b.is_empty())
            .ok_or(PlacementError::MissingImage)?;
        Ok(ResidentRequest::new(
            coerce_name(name, defaults::RESIDENT_NAME),
            at,
            bytes,
        ))
    }

    /// Start drawing a road. Replaces any unfinished draft.
    pub fn begin_road(&mut self, highway: bool) {
        self.road_draft = Some(RoadDraft {
            highway,
            points: Vec::new(),
        });
    }

    /// Add a waypoint to the current draft. Returns false when not drafting.
    pub fn add_road_point(&mut self, at: Point) -> bool {
        match self.road_draft.as_mut() {
            Some(draft) => {
                draft.points.push(at);
                true
            }
            None => false,
        }
    }

    /// Commit the draft as a road if it has at least two points.
    pub fn finish_road(&mut self) -> Option<usize> {
        let draft = self.road_draft.take()?;
        if draft.points.len() < 2 {
            tracing::debug!(points = draft.points.len(), "discarded short road draft");
            return None;
        }
        Some(self.push_object(PlacedObject::Road {
            points: draft.points,
            highway: draft.highway,
        }))
    }

    pub fn cancel_road(&mut self) {
        self.road_draft = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::Arrival;

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    #[test]
    fn every_kind_appends_one_record_at_the_pointer() {
        let mut world = World::new();
        let kinds = [
            PlaceKind::Foundation,
            PlaceKind::Wheel,
            PlaceKind::House,
            PlaceKind::Company,
            PlaceKind::Road,
            PlaceKind::Highway,
            PlaceKind::Car,
        ];
        for (i, kind) in kinds.into_iter().enumerate() {
            let at = p(10.0 * i as f64, 7.0);
            let idx = world.place(&PlaceRequest::at(kind, at.x, at.y));
            assert_eq!(idx, i);
            assert_eq!(world.objects().len(), i + 1);
            assert_eq!(world.objects()[idx].position(), at);
        }
    }

    #[test]
    fn house_defaults_match_documented_values() {
        let mut world = World::new();
        world.create_house(p(50.0, 50.0), None, None);
        assert_eq!(
            world.objects(),
            &[PlacedObject::House {
                x: 50.0,
                y: 50.0,
                width: 50,
                height: 50
            }]
        );
    }

    #[test]
    fn non_numeric_input_falls_back_to_default() {
        let mut world = World::new();
        let junk = RawField::from("wide");
        let zero = RawField::from(0.0);
        world.create_foundation(p(0.0, 0.0), Some(&junk), Some(&zero));
        world.create_wheel(p(0.0, 0.0), Some(&RawField::from("")));
        world.create_car(p(0.0, 0.0), Some(&RawField::from("-4")), None, Some(&junk));
        assert_eq!(
            world.objects()[0],
            PlacedObject::Foundation {
                x: 0.0,
                y: 0.0,
                width: defaults::FOUNDATION_WIDTH,
                height: defaults::FOUNDATION_HEIGHT
            }
        );
        assert_eq!(
            world.objects()[1],
            PlacedObject::Wheel {
                x: 0.0,
                y: 0.0,
                radius: defaults::WHEEL_RADIUS
            }
        );
        assert_eq!(
            world.objects()[2],
            PlacedObject::Car {
                x: 0.0,
                y: 0.0,
                width: defaults::CAR_WIDTH,
                height: defaults::CAR_HEIGHT,
                speed: defaults::CAR_SPEED
            }
        );
    }

    #[test]
    fn supplied_values_are_truncated_to_integers() {
        let mut world = World::new();
        world.create_house(p(0.0, 0.0), Some(&RawField::from(" 72.9 ")), Some(&RawField::from(30.0)));
        assert_eq!(
            world.objects()[0],
            PlacedObject::House {
                x: 0.0,
                y: 0.0,
                width: 72,
                height: 30
            }
        );
    }

    #[test]
    fn company_name_defaults_when_blank() {
        let mut world = World::new();
        world.create_company(p(1.0, 1.0), Some(&RawField::from("")), None, None);
        world.create_company(p(1.0, 1.0), Some(&RawField::from("Acme")), None, None);
        let names: Vec<_> = world
            .objects()
            .iter()
            .map(|o| match o {
                PlacedObject::Company { name, .. } => name.clone(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(names, vec![defaults::COMPANY_NAME.to_string(), "Acme".to_string()]);
    }

    #[test]
    fn straight_roads_are_two_point_paths() {
        let mut world = World::new();
        world.create_highway(p(5.0, 6.0), Some(&RawField::from("40")));
        assert_eq!(
            world.objects()[0],
            PlacedObject::Road {
                points: vec![p(5.0, 6.0), p(45.0, 6.0)],
                highway: true
            }
        );
    }

    #[test]
    fn road_draft_commits_only_with_two_points() {
        let mut world = World::new();
        assert!(!world.add_road_point(p(0.0, 0.0)));

        world.begin_road(false);
        world.add_road_point(p(0.0, 0.0));
        assert_eq!(world.finish_road(), None);
        assert!(world.objects().is_empty());
        assert!(world.road_draft().is_none());

        world.begin_road(true);
        for pt in [p(0.0, 0.0), p(10.0, 0.0), p(10.0, 10.0)] {
            assert!(world.add_road_point(pt));
        }
        assert_eq!(world.finish_road(), Some(0));
        match &world.objects()[0] {
            PlacedObject::Road { points, highway } => {
                assert_eq!(points.len(), 3);
                assert!(*highway);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn resident_without_image_is_rejected_and_nothing_appended() {
        let world = World::new();
        let err = world.request_resident(p(0.0, 0.0), None, None).unwrap_err();
        assert!(matches!(err, PlacementError::MissingImage));
        assert!(matches!(
            world.request_resident(p(0.0, 0.0), None, Some(Vec::new())),
            Err(PlacementError::MissingImage)
        ));
        assert!(world.residents().is_empty());
    }

    #[test]
    fn resident_at_non_finite_pointer_is_rejected() {
        let world = World::new();
        for at in [p(f64::NAN, 5.0), p(0.0, f64::INFINITY), p(f64::NEG_INFINITY, 0.0)] {
            let err = world
                .request_resident(at, None, Some(crate::images::tiny_png()))
                .unwrap_err();
            assert!(matches!(err, PlacementError::InvalidPointer { .. }));
        }
        assert!(world.residents().is_empty());
    }

    #[test]
    fn resident_appears_once_its_arrival_is_drained() {
        let mut world = World::new();
        let req = world
            .request_resident(p(3.0, 4.0), Some(&RawField::from("Bo")), Some(crate::images::tiny_png()))
            .unwrap();
        let tx = world.arrivals();
        let handle = std::thread::spawn(move || tx.send(req.decode()).unwrap());
        handle.join().unwrap();
        assert!(world.residents().is_empty());

        world.drain_arrivals();
        assert_eq!(world.residents().len(), 1);
        let r = &world.residents()[0];
        assert_eq!(r.name, "Bo");
        assert_eq!(r.position(), p(3.0, 4.0));
        assert!(world.images().is_ready(&r.image));
    }

    #[test]
    fn image_arrival_only_updates_status() {
        let mut world = World::new();
        world.apply(Arrival::Image {
            id: crate::model::ImageId::from("z"),
            status: crate::images::ImageStatus::Failed,
        });
        assert!(world.residents().is_empty());
        assert!(world.images().is_known(&crate::model::ImageId::from("z")));
    }
}
