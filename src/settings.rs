use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub light_text: String,
    pub dark_text: String,
    pub accent_text: String,
    pub light_stroke: String,
    pub dark_stroke: String,
    pub margin_pct: f32,
    pub default_size_pct: f32,
    pub min_size_pct: f32,
    pub max_size_pct: f32,
    pub default_weight: u16,
    pub edge_weight: f32,
    pub anchor_bias: f32,
    pub early_exit_cost: f32,
    pub font_family: Option<String>,
    pub font_path: Option<String>,
    pub jpeg_quality: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            light_text: "#f7f4ec".to_string(),
            dark_text: "#20232a".to_string(),
            accent_text: "#ffd166".to_string(),
            light_stroke: "#ffffff".to_string(),
            dark_stroke: "#111111".to_string(),
            margin_pct: 1.5,
            default_size_pct: 6.0,
            min_size_pct: 3.0,
            max_size_pct: 9.0,
            default_weight: 700,
            edge_weight: 0.15,
            anchor_bias: 0.02,
            early_exit_cost: 0.08,
            font_family: None,
            font_path: None,
            jpeg_quality: 95,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    style: Option<StyleSettings>,
    solver: Option<SolverSettings>,
    font: Option<FontSettings>,
    export: Option<ExportSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct StyleSettings {
    light_text: Option<String>,
    dark_text: Option<String>,
    accent_text: Option<String>,
    light_stroke: Option<String>,
    dark_stroke: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SolverSettings {
    margin_pct: Option<f32>,
    default_size_pct: Option<f32>,
    min_size_pct: Option<f32>,
    max_size_pct: Option<f32>,
    default_weight: Option<u16>,
    edge_weight: Option<f32>,
    anchor_bias: Option<f32>,
    early_exit_cost: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct FontSettings {
    family: Option<String>,
    path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ExportSettings {
    jpeg_quality: Option<u8>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(style) = incoming.style {
            merge_color(&mut self.light_text, style.light_text);
            merge_color(&mut self.dark_text, style.dark_text);
            merge_color(&mut self.accent_text, style.accent_text);
            merge_color(&mut self.light_stroke, style.light_stroke);
            merge_color(&mut self.dark_stroke, style.dark_stroke);
        }
        if let Some(solver) = incoming.solver {
            if let Some(value) = solver.margin_pct {
                if value >= 0.0 {
                    self.margin_pct = value;
                }
            }
            if let Some(value) = solver.default_size_pct {
                if value > 0.0 {
                    self.default_size_pct = value;
                }
            }
            if let Some(value) = solver.min_size_pct {
                if value > 0.0 {
                    self.min_size_pct = value;
                }
            }
            if let Some(value) = solver.max_size_pct {
                if value > 0.0 {
                    self.max_size_pct = value;
                }
            }
            if let Some(value) = solver.default_weight {
                if value > 0 {
                    self.default_weight = value;
                }
            }
            if let Some(value) = solver.edge_weight {
                if value >= 0.0 {
                    self.edge_weight = value;
                }
            }
            if let Some(value) = solver.anchor_bias {
                if value >= 0.0 {
                    self.anchor_bias = value;
                }
            }
            if let Some(value) = solver.early_exit_cost {
                if value >= 0.0 {
                    self.early_exit_cost = value;
                }
            }
        }
        if let Some(font) = incoming.font {
            if let Some(family) = font.family {
                if !family.trim().is_empty() {
                    self.font_family = Some(family);
                }
            }
            if let Some(path) = font.path {
                if !path.trim().is_empty() {
                    self.font_path = Some(path);
                }
            }
        }
        if let Some(export) = incoming.export {
            if let Some(quality) = export.jpeg_quality {
                if quality > 0 && quality <= 100 {
                    self.jpeg_quality = quality;
                }
            }
        }
    }
}

fn merge_color(target: &mut String, incoming: Option<String>) {
    if let Some(color) = incoming {
        if !color.trim().is_empty() {
            *target = color;
        }
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".photo-captioner-rust"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::with_temp_home;

    #[test]
    fn defaults_match_embedded_settings() {
        with_temp_home(|_| {
            let settings = load_settings(None).expect("load settings");
            let defaults = Settings::default();
            assert_eq!(settings.margin_pct, defaults.margin_pct);
            assert_eq!(settings.default_weight, defaults.default_weight);
            assert_eq!(settings.edge_weight, defaults.edge_weight);
            assert_eq!(settings.jpeg_quality, defaults.jpeg_quality);
            assert_eq!(settings.accent_text, defaults.accent_text);
        });
    }

    #[test]
    fn home_settings_file_is_seeded() {
        with_temp_home(|home| {
            load_settings(None).expect("load settings");
            assert!(home.join(".photo-captioner-rust/settings.toml").exists());
        });
    }

    #[test]
    fn extra_path_overrides_sections() {
        with_temp_home(|home| {
            let extra = home.join("override.toml");
            std::fs::write(
                &extra,
                "[solver]\nmargin_pct = 2.5\nearly_exit_cost = 0.05\n[export]\njpeg_quality = 80\n",
            )
            .expect("write override");
            let settings = load_settings(Some(&extra)).expect("load settings");
            assert_eq!(settings.margin_pct, 2.5);
            assert_eq!(settings.early_exit_cost, 0.05);
            assert_eq!(settings.jpeg_quality, 80);
            assert_eq!(settings.default_size_pct, 6.0);
        });
    }

    #[test]
    fn missing_extra_path_is_an_error() {
        with_temp_home(|home| {
            let missing = home.join("nope.toml");
            assert!(load_settings(Some(&missing)).is_err());
        });
    }

    #[test]
    fn blank_values_do_not_clobber_defaults() {
        with_temp_home(|home| {
            let extra = home.join("blank.toml");
            std::fs::write(&extra, "[style]\naccent_text = \"  \"\n").expect("write override");
            let settings = load_settings(Some(&extra)).expect("load settings");
            assert_eq!(settings.accent_text, Settings::default().accent_text);
        });
    }
}
