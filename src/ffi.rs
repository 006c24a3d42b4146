//! FFI bindings for pulse-relay
//!
//! C-compatible functions for hosting the tick pipeline and the gesture
//! detector from a native app. Strings are null-terminated UTF-8; any string
//! returned by this module must be released with `pulse_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::PulseConfig;
use crate::gesture::{GestureConfig, GestureDetector};
use crate::pipeline::{ticks_json_to_samples, TelemetryPipeline};
use crate::types::RawTick;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
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

/// Borrow a C string as UTF-8; `None` for NULL or invalid UTF-8
unsafe fn cstr_to_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

/// Like [`cstr_to_str`] but records an error naming the argument
unsafe fn required_str<'a>(ptr: *const c_char, what: &str) -> Option<&'a str> {
    let s = cstr_to_str(ptr);
    if s.is_none() {
        set_last_error(&format!("Invalid {what} string pointer"));
    }
    s
}

fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Parse an optional config argument; NULL means defaults
unsafe fn config_arg(ptr: *const c_char) -> Option<PulseConfig> {
    if ptr.is_null() {
        return Some(PulseConfig::default());
    }
    let json = required_str(ptr, "config")?;
    match PulseConfig::from_json(json) {
        Ok(config) => Some(config),
        Err(e) => {
            set_last_error(&e.to_string());
            None
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Opaque handle to a tick pipeline
pub struct PulsePipelineHandle {
    pipeline: TelemetryPipeline,
}

/// Create a pipeline.
///
/// # Safety
/// - `baseline_json` may be NULL (no baseline) or a valid C string holding a
///   single baseline record or a baseline store dump.
/// - `config_json` may be NULL (defaults) or a valid C string.
/// - Returns NULL on error; free the handle with `pulse_pipeline_free`.
#[no_mangle]
pub unsafe extern "C" fn pulse_pipeline_new(
    baseline_json: *const c_char,
    config_json: *const c_char,
) -> *mut PulsePipelineHandle {
    clear_last_error();

    let Some(config) = config_arg(config_json) else {
        return ptr::null_mut();
    };
    let baseline = if baseline_json.is_null() {
        None
    } else {
        match required_str(baseline_json, "baseline") {
            Some(s) => Some(s),
            None => return ptr::null_mut(),
        }
    };

    match TelemetryPipeline::from_baseline_json(&config, baseline) {
        Ok(pipeline) => Box::into_raw(Box::new(PulsePipelineHandle { pipeline })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a pipeline.
///
/// # Safety
/// - `handle` must be NULL or a pointer returned by `pulse_pipeline_new`.
#[no_mangle]
pub unsafe extern "C" fn pulse_pipeline_free(handle: *mut PulsePipelineHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Push one tick (JSON) through the pipeline.
///
/// # Safety
/// - `handle` must be a valid pipeline handle; `tick_json` a valid C string.
/// - Returns the sample JSON when this tick completes a window (free with
///   `pulse_free_string`), otherwise NULL. A NULL result with
///   `pulse_last_error` also NULL just means the window is still filling.
#[no_mangle]
pub unsafe extern "C" fn pulse_pipeline_push_tick(
    handle: *mut PulsePipelineHandle,
    tick_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null pipeline pointer");
        return ptr::null_mut();
    }
    let handle = &*handle;

    let Some(json) = required_str(tick_json, "tick") else {
        return ptr::null_mut();
    };
    let tick: RawTick = match serde_json::from_str(json) {
        Ok(tick) => tick,
        Err(e) => {
            set_last_error(&format!("Invalid JSON: {e}"));
            return ptr::null_mut();
        }
    };

    match handle.pipeline.process_tick(tick) {
        Some(sample) => match serde_json::to_string(&sample) {
            Ok(json) => string_to_cstr(&json),
            Err(e) => {
                set_last_error(&e.to_string());
                ptr::null_mut()
            }
        },
        None => ptr::null_mut(),
    }
}

/// Ticks waiting in the current window, or -1 for a NULL handle.
///
/// # Safety
/// - `handle` must be NULL or a valid pipeline handle.
#[no_mangle]
pub unsafe extern "C" fn pulse_pipeline_pending(handle: *const PulsePipelineHandle) -> i32 {
    if handle.is_null() {
        return -1;
    }
    i32::try_from((*handle).pipeline.pending()).unwrap_or(i32::MAX)
}

/// Drop the partial window; returns the number of dropped ticks or -1.
///
/// # Safety
/// - `handle` must be NULL or a valid pipeline handle.
#[no_mangle]
pub unsafe extern "C" fn pulse_pipeline_discard_partial(handle: *mut PulsePipelineHandle) -> i32 {
    if handle.is_null() {
        return -1;
    }
    i32::try_from((*handle).pipeline.discard_partial()).unwrap_or(i32::MAX)
}

/// Convert a JSON array of ticks into a JSON array of samples.
///
/// # Safety
/// - `ticks_json` must be a valid C string; `baseline_json` may be NULL.
/// - Returns NULL on error; free the result with `pulse_free_string`.
#[no_mangle]
pub unsafe extern "C" fn pulse_ticks_to_samples(
    ticks_json: *const c_char,
    baseline_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(ticks) = required_str(ticks_json, "ticks") else {
        return ptr::null_mut();
    };
    let baseline = cstr_to_str(baseline_json);

    match ticks_json_to_samples(ticks, baseline) {
        Ok(samples) => string_to_cstr(&format!("[{}]", samples.join(","))),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Gesture detector
// ============================================================================

/// Opaque handle to a gesture detector
pub struct PulseGestureHandle {
    detector: GestureDetector,
}

/// Create a gesture detector.
///
/// # Safety
/// - `config_json` may be NULL (defaults) or a valid C string holding a
///   gesture config object.
/// - Returns NULL on error; free with `pulse_gesture_free`.
#[no_mangle]
pub unsafe extern "C" fn pulse_gesture_new(config_json: *const c_char) -> *mut PulseGestureHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        GestureConfig::default()
    } else {
        let Some(json) = required_str(config_json, "config") else {
            return ptr::null_mut();
        };
        let parsed = serde_json::from_str::<GestureConfig>(json)
            .map_err(|e| e.to_string())
            .and_then(|gesture| {
                let full = PulseConfig {
                    gesture,
                    ..Default::default()
                };
                full.validate().map(|_| gesture).map_err(|e| e.to_string())
            });
        match parsed {
            Ok(config) => config,
            Err(msg) => {
                set_last_error(&msg);
                return ptr::null_mut();
            }
        }
    };

    Box::into_raw(Box::new(PulseGestureHandle {
        detector: GestureDetector::new(config),
    }))
}

/// Free a gesture detector.
///
/// # Safety
/// - `handle` must be NULL or a pointer returned by `pulse_gesture_new`.
#[no_mangle]
pub unsafe extern "C" fn pulse_gesture_free(handle: *mut PulseGestureHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Feed an accelerometer sample (m/s²).
///
/// # Safety
/// - `handle` must be NULL or a valid gesture handle.
/// - Returns 1 if a shake fired, 0 if not, -1 for a NULL handle.
#[no_mangle]
pub unsafe extern "C" fn pulse_gesture_accelerometer(
    handle: *mut PulseGestureHandle,
    timestamp_ms: i64,
    x: f64,
    y: f64,
    z: f64,
) -> i32 {
    if handle.is_null() {
        return -1;
    }
    i32::from((*handle).detector.on_accelerometer(timestamp_ms, x, y, z))
}

/// Feed a gyroscope sample (rad/s).
///
/// # Safety
/// - `handle` must be NULL or a valid gesture handle.
/// - Returns 0 on success, -1 for a NULL handle.
#[no_mangle]
pub unsafe extern "C" fn pulse_gesture_gyroscope(
    handle: *mut PulseGestureHandle,
    timestamp_ms: i64,
    x: f64,
    y: f64,
    z: f64,
) -> i32 {
    if handle.is_null() {
        return -1;
    }
    (*handle).detector.on_gyroscope(timestamp_ms, x, y, z);
    0
}

// ============================================================================
// Memory, errors, version
// ============================================================================

/// Free a string returned by this library.
///
/// # Safety
/// - `ptr` must be NULL or a pointer returned by a `pulse_*` function.
#[no_mangle]
pub unsafe extern "C" fn pulse_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

/// Last error message on this thread, or NULL.
///
/// # Safety
/// - Valid until the next `pulse_*` call on this thread. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn pulse_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Library version.
///
/// # Safety
/// - Points to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn pulse_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline_json() -> CString {
        CString::new(
            r#"{
                "sdnn": {"mean": 55.0, "std": 8.0},
                "rmssd": {"mean": 42.0, "std": 6.0},
                "heart_rate": {"mean": 80.0, "std": 10.0},
                "object_temp": {"mean": 34.0, "std": 0.5}
            }"#,
        )
        .unwrap()
    }

    fn tick_json(ts: i64) -> CString {
        CString::new(format!(
            r#"{{"timestamp_ms": {ts}, "heart_rate_bpm": 90.0, "object_temp_c": 34.0}}"#
        ))
        .unwrap()
    }

    #[test]
    fn test_ffi_pipeline_lifecycle() {
        let baseline = baseline_json();
        unsafe {
            let handle = pulse_pipeline_new(baseline.as_ptr(), ptr::null());
            assert!(!handle.is_null());

            for ts in 0..9 {
                let tick = tick_json(ts * 1_000);
                let out = pulse_pipeline_push_tick(handle, tick.as_ptr());
                assert!(out.is_null());
                assert!(pulse_last_error().is_null());
            }
            assert_eq!(pulse_pipeline_pending(handle), 9);

            let tick = tick_json(9_000);
            let out = pulse_pipeline_push_tick(handle, tick.as_ptr());
            assert!(!out.is_null());
            let json = CStr::from_ptr(out).to_str().unwrap();
            let sample: serde_json::Value = serde_json::from_str(json).unwrap();
            assert_eq!(sample["timestamp_ms"], 9_000);
            assert_eq!(sample["is_anomaly"], false);
            pulse_free_string(out);

            let tick = tick_json(10_000);
            assert!(pulse_pipeline_push_tick(handle, tick.as_ptr()).is_null());
            assert_eq!(pulse_pipeline_discard_partial(handle), 1);
            assert_eq!(pulse_pipeline_pending(handle), 0);

            pulse_pipeline_free(handle);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let bad = CString::new("not json").unwrap();
            assert!(pulse_pipeline_new(bad.as_ptr(), ptr::null()).is_null());
            assert!(!pulse_last_error().is_null());

            let handle = pulse_pipeline_new(ptr::null(), ptr::null());
            assert!(!handle.is_null());
            assert!(pulse_pipeline_push_tick(handle, bad.as_ptr()).is_null());
            let error = CStr::from_ptr(pulse_last_error()).to_str().unwrap();
            assert!(error.starts_with("Invalid JSON"));
            pulse_pipeline_free(handle);

            assert!(pulse_pipeline_push_tick(ptr::null_mut(), bad.as_ptr()).is_null());
            assert_eq!(pulse_pipeline_pending(ptr::null()), -1);

            let bad_config = CString::new(r#"{"window": {"size": 0}}"#).unwrap();
            assert!(pulse_pipeline_new(ptr::null(), bad_config.as_ptr()).is_null());
        }
    }

    #[test]
    fn test_ffi_ticks_to_samples() {
        let ticks: Vec<String> = (0..10)
            .map(|ts| tick_json(ts * 1_000).into_string().unwrap())
            .collect();
        let ticks = CString::new(format!("[{}]", ticks.join(","))).unwrap();
        let baseline = baseline_json();

        unsafe {
            let out = pulse_ticks_to_samples(ticks.as_ptr(), baseline.as_ptr());
            assert!(!out.is_null());
            let parsed: serde_json::Value =
                serde_json::from_str(CStr::from_ptr(out).to_str().unwrap()).unwrap();
            assert_eq!(parsed.as_array().unwrap().len(), 1);
            pulse_free_string(out);
        }
    }

    #[test]
    fn test_ffi_gesture() {
        let config = CString::new(r#"{"use_gyro_assist": false}"#).unwrap();
        unsafe {
            let handle = pulse_gesture_new(config.as_ptr());
            assert!(!handle.is_null());

            assert_eq!(pulse_gesture_accelerometer(handle, 1_000, 0.0, 0.0, 9.8), 0);
            let mut fired = 0;
            for (i, t) in [1_050, 1_100, 1_150, 1_200].into_iter().enumerate() {
                let x = if i % 2 == 0 { 30.0 } else { -30.0 };
                fired += pulse_gesture_accelerometer(handle, t, x, 0.0, 9.8);
            }
            assert_eq!(fired, 1);
            assert_eq!(pulse_gesture_gyroscope(handle, 1_300, 3.0, 0.0, 0.0), 0);
            pulse_gesture_free(handle);

            let bad = CString::new(r#"{"alpha": 2.0}"#).unwrap();
            assert!(pulse_gesture_new(bad.as_ptr()).is_null());
            assert_eq!(pulse_gesture_accelerometer(ptr::null_mut(), 0, 0.0, 0.0, 0.0), -1);
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = CStr::from_ptr(pulse_version()).to_str().unwrap();
            assert_eq!(version, crate::PULSE_VERSION);
        }
    }
}
