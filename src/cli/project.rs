//! worklog project command implementations.

use crate::catalog::{NewProject, Project};
use crate::cli::{GlobalOptions, Workspace};
use crate::error::Result;
use crate::output::{emit_success, Report};

pub struct NewOptions {
    pub title: String,
    pub description: String,
    pub owner: Option<String>,
    pub globals: GlobalOptions,
}

#[derive(serde::Serialize)]
struct ProjectListOutput {
    total: usize,
    projects: Vec<ProjectSummary>,
}

#[derive(serde::Serialize)]
struct ProjectSummary {
    #[serde(flatten)]
    project: Project,
    tasks: usize,
}

pub fn run_new(options: NewOptions) -> Result<()> {
    let ws = Workspace::open(&options.globals)?;
    let project = ws.storage.update_catalog(|catalog| {
        catalog.add_project(NewProject {
            title: options.title.clone(),
            description: options.description.clone(),
            owner: options.owner.clone(),
        })
    })?;
    tracing::info!(project = %project.id, slug = %project.slug, "project created");

    let mut human = Report::new("Project created");
    human.field("ID", project.id.to_string());
    human.field("Slug", project.slug.clone());
    human.field("Title", project.title.clone());
    if let Some(owner) = project.owner.as_ref() {
        human.field("Owner", owner.clone());
    }
    human.next_step(format!("worklog task new {} <title>", project.slug));

    emit_success(options.globals.output(), "project new", &project, Some(&human))
}

pub fn run_list(globals: GlobalOptions) -> Result<()> {
    let ws = Workspace::open(&globals)?;
    let catalog = ws.storage.read_catalog()?;

    let projects: Vec<ProjectSummary> = catalog
        .projects
        .iter()
        .map(|project| ProjectSummary {
            tasks: catalog.tasks_in(&project.id).count(),
            project: project.clone(),
        })
        .collect();
    let output = ProjectListOutput {
        total: projects.len(),
        projects,
    };

    let mut human = Report::new("Projects");
    human.field("Total", output.total.to_string());
    for summary in &output.projects {
        human.row(format!(
            "{} {} ({} tasks)",
            summary.project.slug, summary.project.title, summary.tasks
        ));
    }

    emit_success(globals.output(), "project ls", &output, Some(&human))
}
