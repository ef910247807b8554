//! Save and load of the whole world under one well-known key.

use crate::error::GatewayError;
use crate::model::Snapshot;
use crate::store::Storage;
use crate::world::World;
use hamlet_protocol::{keys, Notice};

pub const SAVED_MESSAGE: &str = "Game saved!";
pub const LOADED_MESSAGE: &str = "Game loaded!";

/// Serialize every object and resident and overwrite the stored snapshot.
pub fn save<S: Storage + ?Sized>(world: &mut World, store: &S) -> Result<Notice, GatewayError> {
    world.drain_arrivals();
    let snapshot = world.snapshot();
    let json = serde_json::to_string(&snapshot).map_err(GatewayError::Serialize)?;
    store.write_state(keys::GAME_STATE, &json)?;
    store.record_event(
        "state.saved",
        serde_json::json!({
            "objects": snapshot.objects.len(),
            "residents": snapshot.residents.len(),
        }),
    )?;
    tracing::info!(
        objects = snapshot.objects.len(),
        residents = snapshot.residents.len(),
        bytes = json.len(),
        "saved world"
    );
    Ok(Notice::info(SAVED_MESSAGE))
}

/// Replace the world with the stored snapshot.
///
/// Returns `Ok(None)` and leaves the world alone when nothing was ever saved.
/// Unparseable data is an error and also leaves the world alone.
pub fn load<S: Storage + ?Sized>(
    world: &mut World,
    store: &S,
) -> Result<Option<Notice>, GatewayError> {
    let Some(json) = store.read_state(keys::GAME_STATE)? else {
        tracing::debug!("no saved world");
        return Ok(None);
    };
    let snapshot: Snapshot = serde_json::from_str(&json).map_err(GatewayError::Malformed)?;
    let (objects, residents) = (snapshot.objects.len(), snapshot.residents.len());
    // The event goes first so a failed write leaves the world as it was.
    store.record_event(
        "state.loaded",
        serde_json::json!({ "objects": objects, "residents": residents }),
    )?;
    world.replace(snapshot);
    tracing::info!(objects, residents, "loaded world");
    Ok(Some(Notice::info(LOADED_MESSAGE)))
}
