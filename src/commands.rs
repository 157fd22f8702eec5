//! Analysis commands: `projects`, `analyze`, `graph`, `detect`, `suggest`,
//! `generate` and `dismiss`.

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use plotline_core::detector::DetectOptions;
use plotline_core::generator::GenerateRequest;
use plotline_core::models::StructureType;

use crate::app::App;
use crate::report;

/// Pass toggles from `detect` flags, layered over the configured defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectFlags {
    pub no_timeline: bool,
    pub no_characters: bool,
    pub no_setups: bool,
    pub no_pov: bool,
    pub assist: bool,
}

impl DetectFlags {
    pub fn options(&self, defaults: &DetectOptions) -> DetectOptions {
        DetectOptions {
            timeline: defaults.timeline && !self.no_timeline,
            character_consistency: defaults.character_consistency && !self.no_characters,
            unresolved_setups: defaults.unresolved_setups && !self.no_setups,
            pov: defaults.pov && !self.no_pov,
            ..DetectOptions::default()
        }
    }
}

/// A token cancelled on Ctrl-C.
pub fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            child.cancel();
        }
    });
    token
}

pub async fn run_projects(app: &App, json: bool) -> Result<()> {
    let projects = app.service.list_projects().await?;
    report::emit(json, &projects, report::projects)
}

pub async fn run_analyze(app: &App, project: &str, json: bool) -> Result<()> {
    let arc = app.service.analyze_project(project).await?;
    report::emit(json, &arc, report::arc)
}

pub async fn run_graph(app: &App, project: &str, json: bool) -> Result<()> {
    let graph = app.service.get_character_graph(project).await?;
    report::emit(json, &graph, report::graph)
}

pub async fn run_detect(app: &App, project: &str, flags: DetectFlags, json: bool) -> Result<()> {
    let options = flags.options(&app.service.settings().detect);
    let assist = flags.assist || app.service.settings().ai_assist;
    let report = app
        .service
        .detect_plot_holes(project, Some(options), Some(assist), &interrupt_token())
        .await?;
    report::emit(json, &report, report::holes)
}

pub async fn run_suggest(app: &App, project: &str, json: bool) -> Result<()> {
    let suggestions = app.service.suggest_plot(project).await?;
    report::emit(json, &suggestions, report::suggestions)
}

#[allow(clippy::too_many_arguments)]
pub async fn run_generate(
    app: &App,
    premise: String,
    genre: String,
    length: u32,
    structure: Option<StructureType>,
    themes: Vec<String>,
    project: Option<String>,
    json: bool,
) -> Result<()> {
    let request = GenerateRequest {
        premise,
        genre,
        target_length: length,
        structure_type: structure,
        themes,
        project_id: project,
    };
    let plot = app.service.generate_plot(&request, &interrupt_token()).await?;
    report::emit(json, &plot, report::structure)
}

pub async fn run_dismiss(app: &App, project: &str, fingerprint: &str) -> Result<()> {
    if app.service.dismiss_plot_hole(project, fingerprint).await? {
        println!("Dismissed {} in {}.", fingerprint, project);
    } else {
        println!("{} was already dismissed in {}.", fingerprint, project);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_only_turn_passes_off() {
        let defaults = DetectOptions {
            pov: false,
            ..DetectOptions::default()
        };
        let flags = DetectFlags {
            no_setups: true,
            ..DetectFlags::default()
        };
        let options = flags.options(&defaults);
        assert!(options.timeline);
        assert!(options.character_consistency);
        assert!(!options.unresolved_setups);
        assert!(!options.pov);
    }
}
