// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Job descriptor building: Collecting -> Validating -> Built.
//!
//! The builder gathers tool-agnostic fields plus per-tool fields, validates
//! them (namespace rewrite, frame padding, extension mapping), and emits the
//! immutable [`JobDescriptor`] handed to the scheduler port.

mod agenda;
mod tools;

pub use agenda::FrameRange;
pub use tools::{FRAME_TOKEN, JobBuilderStrategy, StrategyRegistry, ToolFields, ToolKind};

use std::collections::BTreeMap;

use crate::app::errors::{FarmError, FarmResult};
use crate::app::ports::RemoteFsPort;
use crate::app::types::{FarmLayout, JobDescriptor};
use crate::util::remote_path;

/// Tool-agnostic fields collected from the submission UI. Frame fields stay
/// strings until validation so bad input is reported, not defaulted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonFields {
    pub job_name: String,
    pub cpu_count: u32,
    /// Remote scene path in the home namespace.
    pub job_path: String,
    pub frame_start: String,
    pub frame_end: String,
    pub frame_step: String,
    pub extra_flags: String,
}

/// Resolution of the "job path already exists remotely" prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingPathChoice {
    /// Re-upload over the existing copy.
    Overwrite,
    /// Render from the existing remote copy without re-uploading.
    RenderExisting,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidateOutcome {
    /// Fields validated; `build` may be called.
    Ready,
    /// The job path already exists remotely. The builder does not proceed
    /// until the caller resolves the three-way choice.
    PathExists,
    Cancelled,
}

/// Field set after successful validation; paths are in the render namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFields {
    pub job_name: String,
    pub cpu_count: u32,
    pub scene_path: String,
    pub working_directory: String,
    pub output_path: String,
    pub output_directory: String,
    pub range: FrameRange,
    pub renderer: Option<String>,
    pub format_flag: Option<&'static str>,
    pub camera: Option<String>,
    pub node_path: Option<String>,
    pub extra_flags: String,
    /// False when the artist chose to render from the existing remote copy.
    pub upload_scene: bool,
}

pub struct JobBuilder<'r> {
    registry: &'r StrategyRegistry,
    layout: FarmLayout,
    user: String,
    tool: ToolKind,
    common: CommonFields,
    tool_fields: ToolFields,
    validated: Option<ValidatedFields>,
    /// Set while a `PathExists` outcome awaits its three-way resolution;
    /// `build` refuses to run until it is cleared.
    awaiting_choice: bool,
}

impl<'r> JobBuilder<'r> {
    pub fn new(registry: &'r StrategyRegistry, layout: FarmLayout, user: &str, tool: ToolKind) -> Self {
        Self {
            registry,
            layout,
            user: user.to_string(),
            tool,
            common: CommonFields::default(),
            tool_fields: ToolFields::default(),
            validated: None,
            awaiting_choice: false,
        }
    }

    /// Collecting state: any re-collection invalidates a previous validation.
    pub fn collect(&mut self, common: CommonFields, tool_fields: ToolFields) {
        self.common = common;
        self.tool_fields = tool_fields;
        self.validated = None;
        self.awaiting_choice = false;
    }

    /// Validating state. Checks fields, rewrites namespaces, computes frame
    /// padding, and probes the remote job path; an existing path suspends the
    /// build until [`JobBuilder::resolve_existing`] is called.
    pub async fn validate(&mut self, client: &dyn RemoteFsPort) -> FarmResult<ValidateOutcome> {
        let fields = self.validate_fields()?;
        let exists = client.exists(&self.common.job_path).await?;
        self.validated = Some(fields);
        self.awaiting_choice = exists;
        if exists {
            Ok(ValidateOutcome::PathExists)
        } else {
            Ok(ValidateOutcome::Ready)
        }
    }

    /// Resume after a `PathExists` outcome.
    pub fn resolve_existing(&mut self, choice: ExistingPathChoice) -> ValidateOutcome {
        self.awaiting_choice = false;
        match choice {
            ExistingPathChoice::Overwrite => ValidateOutcome::Ready,
            ExistingPathChoice::RenderExisting => {
                if let Some(v) = self.validated.as_mut() {
                    v.upload_scene = false;
                }
                ValidateOutcome::Ready
            }
            ExistingPathChoice::Cancel => {
                self.validated = None;
                ValidateOutcome::Cancelled
            }
        }
    }

    /// Built state: emit the immutable descriptor.
    pub fn build(&self) -> FarmResult<JobDescriptor> {
        if self.awaiting_choice {
            return Err(FarmError::Validation(
                "the remote job path already exists and the choice is unresolved".into(),
            ));
        }
        let v = self
            .validated
            .as_ref()
            .ok_or_else(|| FarmError::Validation("job fields were not validated".into()))?;
        let strategy = self.strategy()?;
        let invocation = strategy.command_line(v);
        // Pre-render setup: source the helper environment pushed by the
        // bootstrap payload, guaranteed fresh on every connect.
        let command_line = format!(
            ". {}/setenv.sh && {}",
            self.layout.package_root(&self.user),
            invocation
        );
        debug_assert!(!command_line.contains('\n'));

        let mut environment = BTreeMap::new();
        environment.insert("FARM_JOB_NAME".to_string(), v.job_name.clone());
        environment.insert("FARM_FRAME_START".to_string(), v.range.start.to_string());
        environment.insert("FARM_FRAME_END".to_string(), v.range.end.to_string());
        environment.insert("FARM_FRAME_STEP".to_string(), v.range.step.to_string());
        environment.insert("FARM_OUTPUT".to_string(), v.output_path.clone());

        Ok(JobDescriptor {
            name: v.job_name.clone(),
            cpu_count: v.cpu_count,
            working_directory: v.working_directory.clone(),
            environment,
            command_line,
            agenda: agenda::agenda(v.range, v.range.padding_width()),
        })
    }

    pub fn validated(&self) -> Option<&ValidatedFields> {
        self.validated.as_ref()
    }

    fn strategy(&self) -> FarmResult<&dyn JobBuilderStrategy> {
        self.registry
            .get(self.tool)
            .ok_or_else(|| FarmError::Validation(format!("no strategy for {:?}", self.tool)))
    }

    fn validate_fields(&self) -> FarmResult<ValidatedFields> {
        let strategy = self.strategy()?;
        if self.common.job_name.trim().is_empty() {
            return Err(FarmError::Validation("job name must not be empty".into()));
        }
        if self.common.cpu_count == 0 {
            return Err(FarmError::Validation("cpu count must be at least 1".into()));
        }
        let range = FrameRange::parse(
            &self.common.frame_start,
            &self.common.frame_end,
            &self.common.frame_step,
        )?;
        if range.frames().is_empty() {
            return Err(FarmError::Validation(format!(
                "frame range {}-{} produces no frames",
                range.start, range.end
            )));
        }

        // Paths move from the home namespace to the parallel render
        // namespace seen by the scheduler's workers; a path already outside
        // the home root passes through unchanged.
        let scene_path = self
            .layout
            .to_render_namespace(&self.common.job_path)
            .unwrap_or_else(|| remote_path::normalize(&self.common.job_path));
        let working_directory = remote_path::parent(&scene_path)
            .unwrap_or("/")
            .to_string();

        let template = match &self.tool_fields.output_template {
            Some(template) => self
                .layout
                .to_render_namespace(template)
                .unwrap_or_else(|| remote_path::normalize(template)),
            None => remote_path::join(
                &self
                    .layout
                    .to_render_namespace(&self.layout.output_root(&self.user))
                    .unwrap_or_else(|| self.layout.output_root(&self.user)),
                &format!(
                    "{}/frame_####.{}",
                    self.common.job_name.trim(),
                    strategy.default_extension()
                ),
            ),
        };
        let output_path = pad_frame_tokens(&template, range.padding_width());
        let output_directory = remote_path::parent(&output_path)
            .unwrap_or("/")
            .to_string();
        let format_flag = extension_of(&output_path).and_then(|ext| strategy.format_flag(ext));

        Ok(ValidatedFields {
            job_name: self.common.job_name.trim().to_string(),
            cpu_count: self.common.cpu_count,
            scene_path,
            working_directory,
            output_path,
            output_directory,
            range,
            renderer: self.tool_fields.renderer.clone(),
            format_flag,
            camera: self.tool_fields.camera.clone(),
            node_path: self.tool_fields.node_path.clone(),
            extra_flags: sanitize_flags(&self.common.extra_flags),
            upload_scene: true,
        })
    }
}

/// Widen the last `#` run in the filename to at least `width` digits. A
/// template without `#` tokens is left alone; frame numbering is then the
/// renderer's business.
fn pad_frame_tokens(template: &str, width: usize) -> String {
    let Some(run_end) = template.rfind('#') else {
        return template.to_string();
    };
    let run_start = template[..=run_end]
        .rfind(|c| c != '#')
        .map(|idx| idx + 1)
        .unwrap_or(0);
    let run_len = run_end + 1 - run_start;
    if run_len >= width {
        return template.to_string();
    }
    format!(
        "{}{}{}",
        &template[..run_start],
        "#".repeat(width),
        &template[run_end + 1..]
    )
}

fn extension_of(path: &str) -> Option<&str> {
    let name = remote_path::basename(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}

/// The command line must never embed unescaped user-supplied newlines;
/// collapse them to spaces.
fn sanitize_flags(raw: &str) -> String {
    raw.replace(['\n', '\r'], " ").trim().to_string()
}
