//! # sync-ffi
//!
//! C ABI for chainsync-bridge.
//!
//! Every entry point returns an `int32_t` status (0 on success, negative
//! [`StatusCode`] on failure) and parks its payload in a per-thread slot,
//! fetched with `chainsync_get_result` or `chainsync_get_last_error` and
//! released with `chainsync_free_string`. See `include/chainsync.h`.
//!
//! The process-wide [`Bridge`] is built lazily on the first session or
//! lookup call, from the configuration given to `chainsync_init` (or the
//! defaults), around the engine registered with [`install_engine`].

#![warn(clippy::all)]

pub mod channel;
pub mod cstring;
pub mod logging;

use chainsync_bridge::{Bridge, BridgeConfig, BridgeError, StatusCode};
use chainsync_engine::SyncEngine;
use chainsync_types::SessionId;
use cstring::{from_foreign, release_foreign, to_foreign};
use serde::Serialize;
use std::any::Any;
use std::ffi::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{debug, error};

static ENGINE: OnceLock<Arc<dyn SyncEngine>> = OnceLock::new();
static CONFIG: OnceLock<BridgeConfig> = OnceLock::new();
static BRIDGE: OnceLock<Bridge> = OnceLock::new();

// ============================================================
// Rust-side setup
// ============================================================

/// Register the sync engine every session and lookup will use.
///
/// Must happen before the first session or lookup call; a second engine is
/// rejected.
pub fn install_engine(engine: Arc<dyn SyncEngine>) -> Result<(), BridgeError> {
    ENGINE
        .set(engine)
        .map_err(|_| BridgeError::General("sync engine already installed".to_string()))
}

fn bridge() -> Result<&'static Bridge, BridgeError> {
    if let Some(bridge) = BRIDGE.get() {
        return Ok(bridge);
    }
    let engine = ENGINE
        .get()
        .cloned()
        .ok_or_else(|| BridgeError::General("no sync engine installed".to_string()))?;
    let config = CONFIG.get().cloned().unwrap_or_default();
    let bridge = Bridge::new(config, engine)?;
    // A racing thread may have won; its bridge is kept and ours dropped.
    Ok(BRIDGE.get_or_init(|| bridge))
}

// ============================================================
// Call convention helpers
// ============================================================

/// Run an entry point body: catch panics, route payload and error to the
/// per-thread channel, return the status code.
fn run<F>(name: &str, body: F) -> i32
where
    F: FnOnce() -> Result<Option<String>, BridgeError>,
{
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(payload)) => {
            if let Some(payload) = payload {
                channel::set_result(payload);
            }
            StatusCode::Success.code()
        }
        Ok(Err(err)) => {
            debug!(call = name, error = %err, "call failed");
            channel::set_error(err.to_string());
            err.status_code().code()
        }
        Err(panic) => {
            let message = format!("internal panic: {}", panic_message(panic.as_ref()));
            error!(call = name, %message, "entry point panicked");
            channel::set_error(message);
            StatusCode::General.code()
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn session_id(raw: i32) -> Result<SessionId, BridgeError> {
    SessionId::from_raw(raw).ok_or(BridgeError::SessionNotFound(i64::from(raw)))
}

fn to_json<T: Serialize>(value: &T) -> Result<Option<String>, BridgeError> {
    serde_json::to_string(value)
        .map(Some)
        .map_err(|e| BridgeError::Serialization(e.to_string()))
}

fn read_slot(value: Option<String>) -> *mut c_char {
    to_foreign(value.as_deref().unwrap_or(""))
}

// ============================================================
// Library entry points
// ============================================================

/// Load configuration and install logging. Optional; a null path keeps the
/// defaults. Calling it again, or after the first session call, changes
/// nothing.
///
/// # Safety
///
/// `config_path` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn chainsync_init(config_path: *const c_char) -> i32 {
    run("chainsync_init", || {
        let config = if config_path.is_null() {
            BridgeConfig::default()
        } else {
            let path = from_foreign(config_path).ok_or_else(|| {
                BridgeError::InvalidArgument("Config path is not valid UTF-8".to_string())
            })?;
            BridgeConfig::from_file(Path::new(&path))
                .map_err(|e| BridgeError::InvalidArgument(e.to_string()))?
        };

        logging::init_logging(&config.logging.filter);
        if CONFIG.set(config).is_err() || BRIDGE.get().is_some() {
            debug!("chainsync already initialized");
        }
        Ok(None)
    })
}

/// Library version; payload is the version string.
#[no_mangle]
pub extern "C" fn chainsync_version() -> i32 {
    run("chainsync_version", || {
        Ok(Some(env!("CARGO_PKG_VERSION").to_string()))
    })
}

/// Copy of this thread's last result. Empty if none. Free with
/// `chainsync_free_string`.
#[no_mangle]
pub extern "C" fn chainsync_get_result() -> *mut c_char {
    catch_unwind(|| read_slot(channel::result())).unwrap_or(std::ptr::null_mut())
}

/// Copy of this thread's last error. Empty if none. Free with
/// `chainsync_free_string`.
#[no_mangle]
pub extern "C" fn chainsync_get_last_error() -> *mut c_char {
    catch_unwind(|| read_slot(channel::last_error())).unwrap_or(std::ptr::null_mut())
}

/// Release a string returned by this library. Null is a no-op.
///
/// # Safety
///
/// `ptr` must be null or a string returned by this library and not yet freed.
#[no_mangle]
pub unsafe extern "C" fn chainsync_free_string(ptr: *mut c_char) {
    let _ = catch_unwind(AssertUnwindSafe(|| release_foreign(ptr)));
}

// ============================================================
// One-shot lookups
// ============================================================

/// Find a node's tip. Payload: `{"slot":N,"hash":"..","block":N}`.
///
/// A non-positive `timeout_ms` uses the configured lookup timeout.
///
/// # Safety
///
/// `host` and `well_known_hash` must be null or valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn chainsync_tip_find(
    host: *const c_char,
    port: i32,
    protocol_magic: u64,
    well_known_slot: u64,
    well_known_hash: *const c_char,
    timeout_ms: i64,
) -> i32 {
    run("chainsync_tip_find", || {
        let (host, hash) = (from_foreign(host), from_foreign(well_known_hash));
        let tip =
            bridge()?.tip_find(host, port, protocol_magic, well_known_slot, hash, timeout_ms)?;
        to_json(&tip)
    })
}

/// Ask a node for peers. Payload: `[{"type":..,"address":..,"port":N}]`.
///
/// # Safety
///
/// `host` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn chainsync_peer_discovery(
    host: *const c_char,
    port: i32,
    protocol_magic: u64,
    request_amount: i32,
    timeout_ms: i64,
) -> i32 {
    run("chainsync_peer_discovery", || {
        let host = from_foreign(host);
        let peers =
            bridge()?.peer_discovery(host, port, protocol_magic, request_amount, timeout_ms)?;
        to_json(&peers)
    })
}

// ============================================================
// Continuous sync sessions
// ============================================================

/// Create a continuous session. Payload: the session id.
///
/// # Safety
///
/// `host` and `well_known_hash` must be null or valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn chainsync_block_sync_create(
    host: *const c_char,
    port: i32,
    protocol_magic: u64,
    well_known_slot: u64,
    well_known_hash: *const c_char,
) -> i32 {
    run("chainsync_block_sync_create", || {
        let (host, hash) = (from_foreign(host), from_foreign(well_known_hash));
        let id =
            bridge()?.block_sync_create(host, port, protocol_magic, well_known_slot, hash)?;
        Ok(Some(id.to_string()))
    })
}

/// Start syncing from a point. Blocks until the handshake completes.
///
/// # Safety
///
/// `from_hash` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn chainsync_block_sync_start(
    session_id_raw: i32,
    from_slot: u64,
    from_hash: *const c_char,
) -> i32 {
    run("chainsync_block_sync_start", || {
        let id = session_id(session_id_raw)?;
        bridge()?.block_sync_start(id, from_slot, from_foreign(from_hash))?;
        Ok(None)
    })
}

/// Start syncing from the node's tip. Blocks until the handshake completes.
#[no_mangle]
pub extern "C" fn chainsync_block_sync_start_from_tip(session_id_raw: i32) -> i32 {
    run("chainsync_block_sync_start_from_tip", || {
        bridge()?.block_sync_start_from_tip(session_id(session_id_raw)?)?;
        Ok(None)
    })
}

/// Wait up to `timeout_ms` for one event. Payload: the event JSON.
#[no_mangle]
pub extern "C" fn chainsync_block_sync_poll(session_id_raw: i32, timeout_ms: i64) -> i32 {
    run("chainsync_block_sync_poll", || {
        let json = bridge()?.block_sync_poll(session_id(session_id_raw)?, timeout_ms)?;
        Ok(Some(json))
    })
}

/// Stop a continuous session. It stays registered.
#[no_mangle]
pub extern "C" fn chainsync_block_sync_stop(session_id_raw: i32) -> i32 {
    run("chainsync_block_sync_stop", || {
        bridge()?.block_sync_stop(session_id(session_id_raw)?)?;
        Ok(None)
    })
}

/// Stop and unregister a continuous session.
#[no_mangle]
pub extern "C" fn chainsync_block_sync_destroy(session_id_raw: i32) -> i32 {
    run("chainsync_block_sync_destroy", || {
        bridge()?.block_sync_destroy(session_id(session_id_raw)?)?;
        Ok(None)
    })
}

/// Payload: `{"id":N,"started":bool,"running":bool}`.
#[no_mangle]
pub extern "C" fn chainsync_block_sync_status(session_id_raw: i32) -> i32 {
    run("chainsync_block_sync_status", || {
        let status = bridge()?.block_sync_status(session_id(session_id_raw)?)?;
        to_json(&status)
    })
}

// ============================================================
// Range sync sessions
// ============================================================

/// Create a range session. Payload: the session id.
///
/// # Safety
///
/// `host` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn chainsync_block_range_sync_create(
    host: *const c_char,
    port: i32,
    protocol_magic: u64,
) -> i32 {
    run("chainsync_block_range_sync_create", || {
        let id = bridge()?.block_range_sync_create(from_foreign(host), port, protocol_magic)?;
        Ok(Some(id.to_string()))
    })
}

/// Connect and handshake a range session. Blocks until the handshake completes.
#[no_mangle]
pub extern "C" fn chainsync_block_range_sync_start(session_id_raw: i32) -> i32 {
    run("chainsync_block_range_sync_start", || {
        bridge()?.block_range_sync_start(session_id(session_id_raw)?)?;
        Ok(None)
    })
}

/// Request the blocks in `[from, to]`. Returns once the request is issued.
///
/// # Safety
///
/// `from_hash` and `to_hash` must be null or valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn chainsync_block_range_sync_fetch(
    session_id_raw: i32,
    from_slot: u64,
    from_hash: *const c_char,
    to_slot: u64,
    to_hash: *const c_char,
) -> i32 {
    run("chainsync_block_range_sync_fetch", || {
        let id = session_id(session_id_raw)?;
        let (from_hash, to_hash) = (from_foreign(from_hash), from_foreign(to_hash));
        bridge()?.block_range_sync_fetch(id, from_slot, from_hash, to_slot, to_hash)?;
        Ok(None)
    })
}

/// Wait up to `timeout_ms` for one event. Payload: the event JSON.
#[no_mangle]
pub extern "C" fn chainsync_block_range_sync_poll(session_id_raw: i32, timeout_ms: i64) -> i32 {
    run("chainsync_block_range_sync_poll", || {
        let json = bridge()?.block_range_sync_poll(session_id(session_id_raw)?, timeout_ms)?;
        Ok(Some(json))
    })
}

/// Stop a range session. It stays registered.
#[no_mangle]
pub extern "C" fn chainsync_block_range_sync_stop(session_id_raw: i32) -> i32 {
    run("chainsync_block_range_sync_stop", || {
        bridge()?.block_range_sync_stop(session_id(session_id_raw)?)?;
        Ok(None)
    })
}

/// Stop and unregister a range session.
#[no_mangle]
pub extern "C" fn chainsync_block_range_sync_destroy(session_id_raw: i32) -> i32 {
    run("chainsync_block_range_sync_destroy", || {
        bridge()?.block_range_sync_destroy(session_id(session_id_raw)?)?;
        Ok(None)
    })
}

/// Payload: `{"id":N,"started":bool,"running":bool}`.
#[no_mangle]
pub extern "C" fn chainsync_block_range_sync_status(session_id_raw: i32) -> i32 {
    run("chainsync_block_range_sync_status", || {
        let status = bridge()?.block_range_sync_status(session_id(session_id_raw)?)?;
        to_json(&status)
    })
}
