/*
 * Test utilities for backlight-sync
 *
 * Builds throwaway sysfs backlight class directories so the registry, the
 * source sensor and the engine can be exercised without real hardware.
 */

#[cfg(test)]
pub mod test_utils {
    use crate::backlight::{ACTUAL_BRIGHTNESS, BRIGHTNESS, MAX_BRIGHTNESS};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    pub const SOURCE_ID: &str = "intel_backlight";

    /// Creates a temporary backlight class directory.
    ///
    /// The temp dir root is the class directory itself. It always contains the
    /// source panel at full brightness (255/255) plus one directory per entry
    /// in `devices`, each with its `max_brightness` and a `brightness` of 0.
    pub fn create_mock_backlight_dir(devices: &[(&str, u32)]) -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join(SOURCE_ID);
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join(MAX_BRIGHTNESS), "255\n").unwrap();
        fs::write(source.join(ACTUAL_BRIGHTNESS), "255\n").unwrap();
        fs::write(source.join(BRIGHTNESS), "255\n").unwrap();

        for (id, max) in devices {
            add_device(temp_dir.path(), id, *max);
        }
        temp_dir
    }

    /// Adds (or resets) an external device under `base`.
    pub fn add_device(base: &Path, id: &str, max: u32) {
        let dir = base.join(id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(MAX_BRIGHTNESS), format!("{}\n", max)).unwrap();
        fs::write(dir.join(BRIGHTNESS), "0").unwrap();
    }

    /// Sets the source panel's actual and maximum brightness.
    pub fn set_source(base: &Path, actual: u32, max: u32) {
        let source = base.join(SOURCE_ID);
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join(MAX_BRIGHTNESS), format!("{}\n", max)).unwrap();
        fs::write(source.join(ACTUAL_BRIGHTNESS), format!("{}\n", actual)).unwrap();
    }

    /// Makes a device look half torn down, the way ddcci devices do after an
    /// unplug: writes to `brightness` fail and `max_brightness` is gone.
    pub fn break_device(base: &Path, id: &str) {
        let dir = base.join(id);
        let _ = fs::remove_file(dir.join(MAX_BRIGHTNESS));
        let _ = fs::remove_file(dir.join(BRIGHTNESS));
        fs::create_dir_all(dir.join(BRIGHTNESS)).unwrap();
    }

    /// Reads back what the engine wrote to a device.
    pub fn read_brightness(base: &Path, id: &str) -> String {
        fs::read_to_string(base.join(id).join(BRIGHTNESS)).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use crate::backlight::{write_brightness, DeviceRegistry};

    #[test]
    fn test_mock_backlight_dir_layout() {
        let dir = create_mock_backlight_dir(&[("ddcci1", 100)]);
        assert!(dir.path().join(SOURCE_ID).join("actual_brightness").exists());
        assert_eq!(read_brightness(dir.path(), "ddcci1"), "0");
    }

    #[test]
    fn test_break_device() {
        let dir = create_mock_backlight_dir(&[("ddcci1", 100)]);
        break_device(dir.path(), "ddcci1");
        let target = dir.path().join("ddcci1").join("brightness");
        assert!(write_brightness(&target, 10).is_err());

        let registry = DeviceRegistry::new(dir.path(), SOURCE_ID);
        assert!(registry.refresh().unwrap().is_empty());
    }
}
