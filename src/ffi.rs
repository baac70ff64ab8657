//! C-compatible FFI API for cross-language bindings.
//!
//! # ABI Contract
//!
//! All exported functions use `extern "C"` calling convention and `#[no_mangle]`
//! to ensure stable symbol names. The header `include/forge.h` is generated
//! from this file by `build.rs`.
//!
//! ## Memory management
//! - Artifacts and strings returned by `forge_*` functions are allocated on
//!   the Rust heap.
//! - Callers **must** free them with `forge_free_artifact` / `forge_free_string`.
//! - Passing a null pointer to a free function is a no-op.
//!
//! ## Error handling
//! - Functions that can fail return a `c_int`: `0` on success, `1` for a null
//!   pointer argument, `2` for invalid UTF-8, `3` for output that cannot be
//!   represented as a C string, and `10..=16` for pipeline errors
//!   (see [`ErrorKind::code`]).
//! - Error details can be retrieved via `forge_last_error`.
//!
//! ## Thread safety
//! - `forge_last_error` uses a thread-local, so it is safe to call from
//!   multiple threads.
//!
//! ## Usage from Go (cgo)
//! ```go
//! // #cgo LDFLAGS: -lprint_forge
//! // #include "forge.h"
//! import "C"
//! ```

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::slice;

use crate::error::{ErrorKind, ExportError};
use crate::gate::TierCapability;
use crate::pipeline::{ExportArtifact, ExportOrchestrator};
use crate::request::ExportRequest;
use crate::scene::SceneDocument;
use crate::surface::RenderContext;
use crate::units::resolve_geometry;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = RefCell::new(None);
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Record `err` and return its stable code.
fn fail(err: &ExportError) -> c_int {
    set_last_error(&err.to_string());
    err.kind().code()
}

// ---------------------------------------------------------------------------
// C-compatible output types
// ---------------------------------------------------------------------------

/// A finished export as seen from C.
///
/// `bytes`/`len` hold the artifact payload; `mime_type` and
/// `suggested_filename` are NUL-terminated UTF-8. Release everything at
/// once with `forge_free_artifact`.
#[repr(C)]
pub struct ForgeArtifact {
    pub bytes: *mut u8,
    pub len: u32,
    pub mime_type: *mut c_char,
    pub suggested_filename: *mut c_char,
}

impl ForgeArtifact {
    fn empty() -> Self {
        Self {
            bytes: ptr::null_mut(),
            len: 0,
            mime_type: ptr::null_mut(),
            suggested_filename: ptr::null_mut(),
        }
    }

    fn from_artifact(artifact: ExportArtifact) -> Result<Self, String> {
        let len = u32::try_from(artifact.bytes.len())
            .map_err(|_| format!("artifact of {} bytes is too large for the C ABI", artifact.bytes.len()))?;
        let mime_type = CString::new(artifact.mime_type).map_err(|_| "MIME type contained null byte".to_string())?;
        let filename =
            CString::new(artifact.suggested_filename).map_err(|_| "filename contained null byte".to_string())?;
        let raw = Box::into_raw(artifact.bytes.into_boxed_slice()) as *mut u8;
        Ok(Self {
            bytes: raw,
            len,
            mime_type: mime_type.into_raw(),
            suggested_filename: filename.into_raw(),
        })
    }
}

/// Borrow a C string as `&str`, recording the error on failure.
///
/// # Safety
/// `s` must be a valid NUL-terminated string that outlives the returned slice.
unsafe fn str_arg<'a>(s: *const c_char, what: &str) -> Result<&'a str, c_int> {
    CStr::from_ptr(s).to_str().map_err(|e| {
        set_last_error(&format!("Invalid UTF-8 in {what}: {e}"));
        2
    })
}

// ---------------------------------------------------------------------------
// Exports
// ---------------------------------------------------------------------------

/// Export a scene document.
///
/// # Parameters
/// - `scene_ptr`, `scene_len`: UTF-8 scene JSON (need not be NUL-terminated)
/// - `request_json`: NUL-terminated export request JSON; missing fields take
///   their defaults
/// - `capability_json`: NUL-terminated tier capability JSON, or `NULL` for
///   the free tier
/// - `out`: receives the artifact on success (free with `forge_free_artifact`)
///
/// # Returns
/// `0` on success, otherwise an error code and a message in `forge_last_error`.
///
/// # Safety
/// - `scene_ptr` must point to `scene_len` readable bytes.
/// - `request_json` and (if non-null) `capability_json` must be valid
///   NUL-terminated strings.
/// - `out` must be a valid, writable pointer. It is only written on success.
#[no_mangle]
pub unsafe extern "C" fn forge_export(
    scene_ptr: *const u8,
    scene_len: u32,
    request_json: *const c_char,
    capability_json: *const c_char,
    out: *mut ForgeArtifact,
) -> c_int {
    clear_last_error();
    if scene_ptr.is_null() || request_json.is_null() || out.is_null() {
        set_last_error("Null pointer argument");
        return 1;
    }

    let scene_bytes = slice::from_raw_parts(scene_ptr, scene_len as usize);
    let scene_json = match std::str::from_utf8(scene_bytes) {
        Ok(s) => s,
        Err(e) => {
            set_last_error(&format!("Invalid UTF-8: {e}"));
            return 2;
        }
    };
    let request_json = match str_arg(request_json, "request JSON") {
        Ok(s) => s,
        Err(code) => return code,
    };

    let capability = if capability_json.is_null() {
        TierCapability::free()
    } else {
        let json = match str_arg(capability_json, "capability JSON") {
            Ok(s) => s,
            Err(code) => return code,
        };
        match TierCapability::from_json(json) {
            Ok(c) => c,
            Err(e) => return fail(&e),
        }
    };

    let request = match ExportRequest::from_json(request_json) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };
    let document = match SceneDocument::from_json(scene_json) {
        Ok(d) => d,
        Err(e) => return fail(&e),
    };

    let context = RenderContext::new(document);
    match ExportOrchestrator::default().export_one(&context, &request, &capability) {
        Ok(artifact) => match ForgeArtifact::from_artifact(artifact) {
            Ok(c_artifact) => {
                *out = c_artifact;
                0
            }
            Err(msg) => {
                set_last_error(&msg);
                3
            }
        },
        Err(e) => fail(&e),
    }
}

/// Resolve the paper geometry a request would export at.
///
/// # Parameters
/// - `request_json`: NUL-terminated export request JSON
/// - `out_json_ptr`: receives the geometry as JSON (free with `forge_free_string`)
///
/// # Returns
/// `0` on success.
///
/// # Safety
/// `request_json` must be a valid NUL-terminated string and `out_json_ptr`
/// a valid, writable pointer.
#[no_mangle]
pub unsafe extern "C" fn forge_resolve_geometry(request_json: *const c_char, out_json_ptr: *mut *mut c_char) -> c_int {
    clear_last_error();
    if request_json.is_null() || out_json_ptr.is_null() {
        set_last_error("Null pointer argument");
        return 1;
    }
    let json = match str_arg(request_json, "request JSON") {
        Ok(s) => s,
        Err(code) => return code,
    };

    let geometry = match ExportRequest::from_json(json).and_then(|r| resolve_geometry(&r)) {
        Ok(g) => g,
        Err(e) => return fail(&e),
    };
    let out = match serde_json::to_string(&geometry) {
        Ok(s) => s,
        Err(e) => {
            set_last_error(&format!("Could not serialise geometry: {e}"));
            return ErrorKind::IoFailure.code();
        }
    };

    match CString::new(out) {
        Ok(cs) => {
            *out_json_ptr = cs.into_raw();
            0
        }
        Err(_) => {
            set_last_error("JSON contained null byte");
            3
        }
    }
}

// ---------------------------------------------------------------------------
// Memory management
// ---------------------------------------------------------------------------

/// Free everything owned by an artifact filled in by `forge_export` and
/// reset its fields to null.
///
/// # Safety
/// `artifact` must be null or point to a [`ForgeArtifact`] written by
/// `forge_export` that has not been freed yet.
#[no_mangle]
pub unsafe extern "C" fn forge_free_artifact(artifact: *mut ForgeArtifact) {
    if artifact.is_null() {
        return;
    }
    let a = &mut *artifact;
    if !a.bytes.is_null() {
        let _ = Box::from_raw(slice::from_raw_parts_mut(a.bytes, a.len as usize));
    }
    forge_free_string(a.mime_type);
    forge_free_string(a.suggested_filename);
    *a = ForgeArtifact::empty();
}

/// Free a string returned by `forge_resolve_geometry`.
///
/// # Safety
/// `s` must have been returned by Rust's `CString::into_raw`.
#[no_mangle]
pub unsafe extern "C" fn forge_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = CString::from_raw(s);
    }
}

/// Retrieve the last error message. Returns a null-terminated string.
///
/// The returned pointer is valid until the next `forge_*` call on the same
/// thread. The caller should **not** free this pointer – it is managed
/// internally.
///
/// Returns null if the last call succeeded.
#[no_mangle]
pub extern "C" fn forge_last_error() -> *const c_char {
    LAST_ERROR.with(|e| {
        let borrow = e.borrow();
        match borrow.as_ref() {
            Some(cs) => cs.as_ptr(),
            None => ptr::null(),
        }
    })
}

/// Return the library version as a null-terminated string.
/// The caller must **not** free this pointer.
#[no_mangle]
pub extern "C" fn forge_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
