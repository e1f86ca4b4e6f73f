//! Frame size, frame rate and device order selection

use crate::camera::device::{DeviceCharacteristics, DeviceInfo, LensFacing};
use crate::constants::{FULL_HD, HD};
use crate::model::{Framerate, Resolution};

/// Supported sizes, largest area first
pub fn supported_sizes(chars: &DeviceCharacteristics) -> Vec<Resolution> {
    let mut sizes = chars.sizes.clone();
    sizes.sort_by(|a, b| b.area().cmp(&a.area()));
    sizes
}

/// Largest preview size not exceeding the window (when smaller than Full HD)
/// or Full HD
pub fn max_preview_size(chars: &DeviceCharacteristics, window: Option<Resolution>) -> Option<Resolution> {
    let bound = match window {
        Some(win) if win.long_side() < FULL_HD.long_side() && win.short_side() < FULL_HD.short_side() => win,
        _ => FULL_HD,
    };

    supported_sizes(chars)
        .into_iter()
        .find(|size| size.fits_within(&bound))
}

/// Largest size usable for recording; falls back to the preview bound when
/// the device does not report one
pub fn max_record_size(chars: &DeviceCharacteristics) -> Option<Resolution> {
    chars
        .max_record_size
        .or_else(|| max_preview_size(chars, None))
}

/// Largest size within both the record maximum and the HD area
pub fn default_record_size(chars: &DeviceCharacteristics) -> Option<Resolution> {
    let max = max_record_size(chars)?;
    let limit = max.area().min(HD.area());

    supported_sizes(chars)
        .into_iter()
        .find(|size| size.area() <= limit)
}

/// Distinct framerate ranges, highest maximum first, fixed ranges before
/// wider ones with the same maximum
pub fn supported_framerates(chars: &DeviceCharacteristics) -> Vec<Framerate> {
    let mut rates = chars.framerates.clone();
    rates.sort_by(|a, b| b.max().cmp(&a.max()).then(b.min().cmp(&a.min())));
    rates.dedup();
    rates
}

/// Range to request for `target` fps
///
/// Prefers a fixed range at exactly `target`, then the narrowest range
/// containing it, then the range whose maximum is closest.
pub fn best_framerate(chars: &DeviceCharacteristics, target: u32) -> Option<Framerate> {
    let rates = supported_framerates(chars);

    if let Some(fixed) = rates.iter().find(|r| r.is_fixed() && r.min() == target) {
        return Some(*fixed);
    }

    rates
        .iter()
        .filter(|r| r.contains(target))
        .min_by_key(|r| r.max() - r.min())
        .or_else(|| rates.iter().min_by_key(|r| r.max().abs_diff(target)))
        .copied()
}

/// Next device in switching order: external devices, then the first back
/// device, then the first front device. Wraps around; an unknown or absent
/// `current` selects the first one.
pub fn next_device_id(devices: &[DeviceInfo], current: Option<&str>) -> Option<String> {
    let order = switch_order(devices);
    if order.is_empty() {
        return None;
    }

    let next = match current.and_then(|id| order.iter().position(|d| d == id)) {
        Some(index) => (index + 1) % order.len(),
        None => 0,
    };
    order.get(next).cloned()
}

fn switch_order(devices: &[DeviceInfo]) -> Vec<String> {
    let mut external = Vec::new();
    let mut back = None;
    let mut front = None;

    for device in devices.iter().filter(|d| d.backward_compatible) {
        match device.facing {
            LensFacing::External => external.push(device.id.clone()),
            LensFacing::Back => {
                back.get_or_insert_with(|| device.id.clone());
            }
            LensFacing::Front => {
                front.get_or_insert_with(|| device.id.clone());
            }
        }
    }

    external.into_iter().chain(back).chain(front).collect()
}
