// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Per-tool job building strategies.
//!
//! Each content-creation tool gets one strategy implementation; the generic
//! builder resolves `ToolKind -> Strategy` once through the registry instead
//! of string-matching at call sites. The command lines carry the scheduler's
//! frame placeholder token, substituted per agenda item by the dispatcher.

use std::collections::HashMap;

use super::ValidatedFields;

/// Frame-number placeholder understood by the scheduler's dispatcher.
pub const FRAME_TOKEN: &str = "@FRAME@";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Blender,
    Maya,
    Houdini,
    NukeX,
    Katana,
}

impl ToolKind {
    pub const ALL: [ToolKind; 5] = [
        ToolKind::Blender,
        ToolKind::Maya,
        ToolKind::Houdini,
        ToolKind::NukeX,
        ToolKind::Katana,
    ];
}

/// Tool-specific inputs collected alongside the common job fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolFields {
    /// Renderer choice where the tool has one (Maya, Houdini).
    pub renderer: Option<String>,
    pub camera: Option<String>,
    /// ROP path (Houdini), write node (Nuke), render node (Katana).
    pub node_path: Option<String>,
    /// Output filename template, `#` runs mark the frame number.
    pub output_template: Option<String>,
}

pub trait JobBuilderStrategy: Send + Sync {
    fn kind(&self) -> ToolKind;

    /// Fixed lookup from output extension to the renderer's format flag
    /// value. `None` means unmapped: the extension is allowed through and
    /// the renderer default applies (soft-fail, never blocks submission).
    fn format_flag(&self, extension: &str) -> Option<&'static str>;

    fn default_extension(&self) -> &'static str;

    /// The render invocation with [`FRAME_TOKEN`] in place of the frame
    /// number. All paths are already rewritten into the render namespace.
    fn command_line(&self, job: &ValidatedFields) -> String;
}

/// `ToolKind -> Strategy` mapping resolved once at startup.
pub struct StrategyRegistry {
    strategies: HashMap<ToolKind, Box<dyn JobBuilderStrategy>>,
}

impl StrategyRegistry {
    pub fn with_builtin() -> Self {
        let mut strategies: HashMap<ToolKind, Box<dyn JobBuilderStrategy>> = HashMap::new();
        strategies.insert(ToolKind::Blender, Box::new(Blender));
        strategies.insert(ToolKind::Maya, Box::new(Maya));
        strategies.insert(ToolKind::Houdini, Box::new(Houdini));
        strategies.insert(ToolKind::NukeX, Box::new(NukeX));
        strategies.insert(ToolKind::Katana, Box::new(Katana));
        Self { strategies }
    }

    pub fn get(&self, kind: ToolKind) -> Option<&dyn JobBuilderStrategy> {
        self.strategies.get(&kind).map(Box::as_ref)
    }
}

struct Blender;

impl JobBuilderStrategy for Blender {
    fn kind(&self) -> ToolKind {
        ToolKind::Blender
    }

    fn format_flag(&self, extension: &str) -> Option<&'static str> {
        match extension {
            "exr" => Some("OPEN_EXR"),
            "png" => Some("PNG"),
            "jpg" | "jpeg" => Some("JPEG"),
            "tif" | "tiff" => Some("TIFF"),
            _ => None,
        }
    }

    fn default_extension(&self) -> &'static str {
        "exr"
    }

    fn command_line(&self, job: &ValidatedFields) -> String {
        let mut cmd = format!("blender -b {} -o {}", job.scene_path, job.output_path);
        if let Some(flag) = job.format_flag {
            cmd.push_str(&format!(" -F {flag}"));
        }
        push_extra(&mut cmd, &job.extra_flags);
        cmd.push_str(&format!(" -noaudio -f {FRAME_TOKEN}"));
        cmd
    }
}

struct Maya;

impl JobBuilderStrategy for Maya {
    fn kind(&self) -> ToolKind {
        ToolKind::Maya
    }

    fn format_flag(&self, extension: &str) -> Option<&'static str> {
        match extension {
            "exr" => Some("exr"),
            "png" => Some("png"),
            "tif" | "tiff" => Some("tif"),
            "iff" => Some("iff"),
            _ => None,
        }
    }

    fn default_extension(&self) -> &'static str {
        "exr"
    }

    fn command_line(&self, job: &ValidatedFields) -> String {
        let renderer = job.renderer.as_deref().unwrap_or("arnold");
        let mut cmd = format!("Render -r {renderer}");
        if let Some(camera) = &job.camera {
            cmd.push_str(&format!(" -cam {camera}"));
        }
        if let Some(flag) = job.format_flag {
            cmd.push_str(&format!(" -of {flag}"));
        }
        cmd.push_str(&format!(" -rd {}", job.output_directory));
        push_extra(&mut cmd, &job.extra_flags);
        cmd.push_str(&format!(
            " -s {FRAME_TOKEN} -e {FRAME_TOKEN} {}",
            job.scene_path
        ));
        cmd
    }
}

struct Houdini;

impl JobBuilderStrategy for Houdini {
    fn kind(&self) -> ToolKind {
        ToolKind::Houdini
    }

    fn format_flag(&self, extension: &str) -> Option<&'static str> {
        match extension {
            "exr" => Some("exr"),
            "pic" => Some("pic"),
            "png" => Some("png"),
            _ => None,
        }
    }

    fn default_extension(&self) -> &'static str {
        "exr"
    }

    fn command_line(&self, job: &ValidatedFields) -> String {
        let rop = job.node_path.as_deref().unwrap_or("/out/mantra1");
        let mut cmd = format!("hrender -e -d {rop}");
        cmd.push_str(&format!(" -o {}", job.output_path));
        push_extra(&mut cmd, &job.extra_flags);
        cmd.push_str(&format!(" -f {FRAME_TOKEN} {FRAME_TOKEN} {}", job.scene_path));
        cmd
    }
}

struct NukeX;

impl JobBuilderStrategy for NukeX {
    fn kind(&self) -> ToolKind {
        ToolKind::NukeX
    }

    fn format_flag(&self, extension: &str) -> Option<&'static str> {
        match extension {
            "exr" => Some("exr"),
            "dpx" => Some("dpx"),
            "tif" | "tiff" => Some("tiff"),
            _ => None,
        }
    }

    fn default_extension(&self) -> &'static str {
        "exr"
    }

    fn command_line(&self, job: &ValidatedFields) -> String {
        let mut cmd = "nuke --nukex -x".to_string();
        if let Some(node) = &job.node_path {
            cmd.push_str(&format!(" -X {node}"));
        }
        push_extra(&mut cmd, &job.extra_flags);
        cmd.push_str(&format!(
            " -F {FRAME_TOKEN}-{FRAME_TOKEN} {}",
            job.scene_path
        ));
        cmd
    }
}

struct Katana;

impl JobBuilderStrategy for Katana {
    fn kind(&self) -> ToolKind {
        ToolKind::Katana
    }

    fn format_flag(&self, extension: &str) -> Option<&'static str> {
        match extension {
            "exr" => Some("exr"),
            "png" => Some("png"),
            _ => None,
        }
    }

    fn default_extension(&self) -> &'static str {
        "exr"
    }

    fn command_line(&self, job: &ValidatedFields) -> String {
        let node = job.node_path.as_deref().unwrap_or("render");
        let mut cmd = format!(
            "katana --batch --katana-file={} --render-node={node}",
            job.scene_path
        );
        push_extra(&mut cmd, &job.extra_flags);
        cmd.push_str(&format!(" -t {FRAME_TOKEN}"));
        cmd
    }
}

fn push_extra(cmd: &mut String, extra: &str) {
    if !extra.is_empty() {
        cmd.push(' ');
        cmd.push_str(extra);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_every_tool() {
        let registry = StrategyRegistry::with_builtin();
        for kind in ToolKind::ALL {
            assert_eq!(registry.get(kind).unwrap().kind(), kind);
        }
    }

    #[test]
    fn unmapped_extensions_fall_through() {
        let registry = StrategyRegistry::with_builtin();
        let blender = registry.get(ToolKind::Blender).unwrap();
        assert_eq!(blender.format_flag("exr"), Some("OPEN_EXR"));
        assert_eq!(blender.format_flag("webp"), None);
    }
}
