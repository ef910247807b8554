use crate::error::PlacementError;
use crate::images::{Arrival, ImageBank};
use crate::model::{Action, ImageId, PlacedObject, Resident, Snapshot};
use hamlet_protocol::Point;
use std::sync::mpsc::{self, Receiver, Sender};

/// A road being drawn point by point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoadDraft {
    pub highway: bool,
    pub points: Vec<Point>,
}

/// The entity store: every placed object and resident, in insertion order.
#[derive(Debug)]
pub struct World {
    pub(crate) objects: Vec<PlacedObject>,
    pub(crate) residents: Vec<Resident>,
    pub(crate) images: ImageBank,
    pub(crate) road_draft: Option<RoadDraft>,
    inbox_tx: Sender<Arrival>,
    inbox_rx: Receiver<Arrival>,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        let (inbox_tx, inbox_rx) = mpsc::channel();
        Self {
            objects: Vec::new(),
            residents: Vec::new(),
            images: ImageBank::default(),
            road_draft: None,
            inbox_tx,
            inbox_rx,
        }
    }

    pub fn objects(&self) -> &[PlacedObject] {
        &self.objects
    }

    pub fn residents(&self) -> &[Resident] {
        &self.residents
    }

    pub fn images(&self) -> &ImageBank {
        &self.images
    }

    pub fn road_draft(&self) -> Option<&RoadDraft> {
        self.road_draft.as_ref()
    }

    /// Handle for delivering asynchronous load results.
    pub fn arrivals(&self) -> Sender<Arrival> {
        self.inbox_tx.clone()
    }

    /// Apply every arrival received so far. Returns how many were applied.
    pub fn drain_arrivals(&mut self) -> usize {
        let mut n = 0;
        while let Ok(arrival) = self.inbox_rx.try_recv() {
            self.apply(arrival);
            n += 1;
        }
        n
    }

    pub fn apply(&mut self, arrival: Arrival) {
        match arrival {
            Arrival::Resident { resident, status } => {
                tracing::debug!(name = %resident.name, image = %resident.image, "resident arrived");
                self.images.set(resident.image.clone(), status);
                self.residents.push(resident);
            }
            Arrival::Image { id, status } => {
                self.images.set(id, status);
            }
        }
    }

    pub(crate) fn push_object(&mut self, obj: PlacedObject) -> usize {
        tracing::debug!(kind = obj.kind(), position = ?obj.position(), "placed object");
        self.objects.push(obj);
        self.objects.len() - 1
    }

    /// Point a resident at a house. The link is positional and is re-checked
    /// every frame.
    pub fn send_home(&mut self, resident: usize, house: usize) -> Result<(), PlacementError> {
        if !self.objects.get(house).is_some_and(PlacedObject::is_house) {
            return Err(PlacementError::NotAHouse(house));
        }
        let r = self
            .residents
            .get_mut(resident)
            .ok_or(PlacementError::NoSuchResident(resident))?;
        r.target_house = Some(house);
        Ok(())
    }

    pub fn set_action(&mut self, resident: usize, action: Action) -> Result<(), PlacementError> {
        let r = self
            .residents
            .get_mut(resident)
            .ok_or(PlacementError::NoSuchResident(resident))?;
        r.action = action;
        Ok(())
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            objects: self.objects.clone(),
            residents: self.residents.clone(),
        }
    }

    /// Swap in a loaded snapshot wholesale. Any road draft is dropped.
    pub fn replace(&mut self, snapshot: Snapshot) {
        self.objects = snapshot.objects;
        self.residents = snapshot.residents;
        self.road_draft = None;
    }

    /// Image ids referenced by residents that have no decode status yet.
    pub fn unresolved_images(&self) -> Vec<ImageId> {
        let mut ids: Vec<ImageId> = self
            .residents
            .iter()
            .map(|r| r.image.clone())
            .filter(|id| !self.images.is_known(id))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::ImageStatus;

    fn resident(name: &str, image: &str) -> Resident {
        Resident {
            name: name.into(),
            x: 0.0,
            y: 0.0,
            image: ImageId::from(image),
            target_house: None,
            action: Action::Wander,
        }
    }

    #[test]
    fn arrivals_are_applied_only_when_drained() {
        let mut world = World::new();
        let tx = world.arrivals();
        tx.send(Arrival::Resident {
            resident: resident("a", "img-a"),
            status: ImageStatus::Ready {
                width: 1,
                height: 1,
            },
        })
        .unwrap();
        assert!(world.residents().is_empty());

        assert_eq!(world.drain_arrivals(), 1);
        assert_eq!(world.residents().len(), 1);
        assert!(world.images().is_ready(&ImageId::from("img-a")));
        assert_eq!(world.drain_arrivals(), 0);
    }

    #[test]
    fn send_home_requires_a_house() {
        let mut world = World::new();
        world.push_object(PlacedObject::Wheel {
            x: 0.0,
            y: 0.0,
            radius: 10,
        });
        world.push_object(PlacedObject::House {
            x: 10.0,
            y: 10.0,
            width: 50,
            height: 50,
        });
        world.apply(Arrival::Resident {
            resident: resident("a", "img"),
            status: ImageStatus::Failed,
        });

        assert!(matches!(
            world.send_home(0, 0),
            Err(PlacementError::NotAHouse(0))
        ));
        assert!(matches!(
            world.send_home(3, 1),
            Err(PlacementError::NoSuchResident(3))
        ));
        world.send_home(0, 1).unwrap();
        assert_eq!(world.residents()[0].target_house, Some(1));
    }

    #[test]
    fn unresolved_images_are_deduplicated() {
        let mut world = World::new();
        world.replace(Snapshot {
            objects: vec![],
            residents: vec![resident("a", "x"), resident("b", "x"), resident("c", "y")],
        });
        world.apply(Arrival::Image {
            id: ImageId::from("y"),
            status: ImageStatus::Failed,
        });
        assert_eq!(world.unresolved_images(), vec![ImageId::from("x")]);
    }
}
