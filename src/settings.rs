use std::path::{Path, PathBuf};

use crate::adjust::DEFAULT_MAX_BLUR;
use crate::error::Result;
use crate::history::DEFAULT_MAX_UNDO_STEPS;
use crate::layer::Color;
use crate::log_warn;

// ============================================================================
// EDITOR SETTINGS — persisted as `key=value` lines
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    pub max_undo_steps: usize,
    pub max_history_mb: usize,
    /// Colour the eraser paints with.
    pub background_color: Color,
    pub brush_size: f32,
    pub brush_color: Color,
    pub brush_opacity: f32,
    pub text_font: String,
    pub text_size: f32,
    pub text_color: Color,
    /// Extra directories searched for font files, after the platform ones.
    pub font_dirs: Vec<PathBuf>,
    pub max_blur: f32,
    pub log_to_stderr: bool,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            max_undo_steps: DEFAULT_MAX_UNDO_STEPS,
            max_history_mb: 100,
            background_color: Color::WHITE,
            brush_size: 5.0,
            brush_color: Color::BLACK,
            brush_opacity: 1.0,
            text_font: "Arial".to_string(),
            text_size: 24.0,
            text_color: Color::BLACK,
            font_dirs: Vec::new(),
            max_blur: DEFAULT_MAX_BLUR,
            log_to_stderr: false,
        }
    }
}

impl EditorSettings {
    /// Location of the settings file.
    ///
    /// On Linux:   $XDG_CONFIG_HOME/editfe/editfe_settings.cfg (~/.config fallback)
    /// On Windows: %APPDATA%\EditFE\editfe_settings.cfg
    /// On macOS:   ~/Library/Application Support/EditFE/editfe_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?;
            Some(PathBuf::from(appdata).join("EditFE").join("editfe_settings.cfg"))
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("EditFE")
                    .join("editfe_settings.cfg"),
            )
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
                .ok()?;
            Some(config_dir.join("editfe").join("editfe_settings.cfg"))
        }
    }

    /// Load settings from disk (returns default if file missing)
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    /// Parse `key=value` lines.  Unknown keys are ignored; a malformed value
    /// keeps the default for that key.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "max_undo_steps" => set_parsed(&mut s.max_undo_steps, key, val),
                "max_history_mb" => set_parsed(&mut s.max_history_mb, key, val),
                "background_color" => set_parsed(&mut s.background_color, key, val),
                "brush_size" => set_parsed(&mut s.brush_size, key, val),
                "brush_color" => set_parsed(&mut s.brush_color, key, val),
                "brush_opacity" => {
                    set_parsed(&mut s.brush_opacity, key, val);
                    s.brush_opacity = crate::layer::clamp_opacity(s.brush_opacity);
                }
                "text_font" => {
                    if !val.is_empty() {
                        s.text_font = val.to_string();
                    }
                }
                "text_size" => set_parsed(&mut s.text_size, key, val),
                "text_color" => set_parsed(&mut s.text_color, key, val),
                "font_dirs" => {
                    s.font_dirs = val
                        .split(';')
                        .map(str::trim)
                        .filter(|d| !d.is_empty())
                        .map(PathBuf::from)
                        .collect();
                }
                "max_blur" => set_parsed(&mut s.max_blur, key, val),
                "log_to_stderr" => s.log_to_stderr = val == "true",
                _ => {}
            }
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        let font_dirs = self
            .font_dirs
            .iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(";");
        format!(
            "max_undo_steps={}\n\
             max_history_mb={}\n\
             background_color={}\n\
             brush_size={}\n\
             brush_color={}\n\
             brush_opacity={}\n\
             text_font={}\n\
             text_size={}\n\
             text_color={}\n\
             font_dirs={}\n\
             max_blur={}\n\
             log_to_stderr={}\n",
            self.max_undo_steps,
            self.max_history_mb,
            self.background_color.to_hex(),
            self.brush_size,
            self.brush_color.to_hex(),
            self.brush_opacity,
            self.text_font,
            self.text_size,
            self.text_color.to_hex(),
            font_dirs,
            self.max_blur,
            self.log_to_stderr,
        )
    }

    /// Save settings to the default location.
    pub fn save(&self) -> Result<()> {
        match Self::settings_path() {
            Some(path) => self.save_to(&path),
            None => Ok(()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, self.to_config_string())?;
        Ok(())
    }

    pub fn max_history_bytes(&self) -> usize {
        self.max_history_mb.saturating_mul(1024 * 1024)
    }
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, key: &str, val: &str) {
    match val.parse() {
        Ok(v) => *slot = v,
        Err(_) => log_warn!("Settings: ignoring malformed value '{}' for '{}'", val, key),
    }
}
