//! Recent project records
//!
//! The editor keeps a small JSON file listing the chart projects the user has
//! opened. [`ProjectRepository`] abstracts the storage so [`ProjectService`]
//! validation can be tested without touching disk.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{Error, Result};

/// A single project's information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    #[serde(rename = "Name", alias = "name", default)]
    pub name: String,
    /// Project archive path, unique key of the record
    #[serde(rename = "Path", alias = "path", default)]
    pub path: String,
    /// Tempo as entered by the user; validated as a positive integer
    #[serde(rename = "Bpm", alias = "bpm", default)]
    pub bpm: String,
}

/// On-disk layout of the projects file
#[derive(Debug, Default, Serialize, Deserialize)]
struct RecentProjectData {
    #[serde(rename = "Projects", alias = "projects", default)]
    projects: Vec<ProjectInfo>,
}

/// Persistence of the full project list
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn load_all(&self) -> Result<Vec<ProjectInfo>>;

    async fn save_all(&self, projects: &[ProjectInfo]) -> Result<()>;
}

/// Project list stored as pretty-printed JSON
pub struct JsonProjectRepository {
    file_path: PathBuf,
}

impl JsonProjectRepository {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

#[async_trait]
impl ProjectRepository for JsonProjectRepository {
    async fn load_all(&self) -> Result<Vec<ProjectInfo>> {
        if !tokio::fs::try_exists(&self.file_path).await? {
            debug!(path = %self.file_path.display(), "Projects file missing, starting empty");
            return Ok(Vec::new());
        }

        let json = tokio::fs::read_to_string(&self.file_path).await?;
        let data: RecentProjectData = serde_json::from_str(&json)?;
        Ok(data.projects)
    }

    async fn save_all(&self, projects: &[ProjectInfo]) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let data = RecentProjectData {
            projects: projects.to_vec(),
        };
        let json = serde_json::to_string_pretty(&data)?;
        tokio::fs::write(&self.file_path, json).await?;
        debug!(path = %self.file_path.display(), count = projects.len(), "Projects saved");
        Ok(())
    }
}

/// Project operations with input validation
pub struct ProjectService {
    repository: Arc<dyn ProjectRepository>,
}

impl ProjectService {
    pub fn new(repository: Arc<dyn ProjectRepository>) -> Self {
        Self { repository }
    }

    pub async fn get_all_projects(&self) -> Result<Vec<ProjectInfo>> {
        self.repository.load_all().await
    }

    pub async fn get_project_by_path(&self, project_path: &str) -> Result<Option<ProjectInfo>> {
        let projects = self.repository.load_all().await?;
        Ok(projects.into_iter().find(|p| p.path == project_path))
    }

    pub async fn create_project(&self, name: &str, bpm: &str, path: &str) -> Result<ProjectInfo> {
        validate_name(name)?;
        validate_bpm(bpm)?;
        if path.trim().is_empty() {
            return Err(Error::InvalidInput("project path must not be empty".to_string()));
        }

        let project = ProjectInfo {
            name: name.to_string(),
            path: path.to_string(),
            bpm: bpm.to_string(),
        };

        let mut projects = self.repository.load_all().await?;
        projects.push(project.clone());
        self.repository.save_all(&projects).await?;

        info!(name = %project.name, path = %project.path, "Project created");
        Ok(project)
    }

    /// Update name and BPM of the project stored under `project.path`
    pub async fn update_project(&self, project: &ProjectInfo) -> Result<()> {
        validate_name(&project.name)?;
        validate_bpm(&project.bpm)?;

        let mut projects = self.repository.load_all().await?;
        let existing = projects
            .iter_mut()
            .find(|p| p.path == project.path)
            .ok_or_else(|| Error::NotFound(format!("project '{}'", project.path)))?;

        existing.name = project.name.clone();
        existing.bpm = project.bpm.clone();

        self.repository.save_all(&projects).await
    }

    pub async fn delete_project(&self, project_path: &str) -> Result<()> {
        let mut projects = self.repository.load_all().await?;
        let index = projects
            .iter()
            .position(|p| p.path == project_path)
            .ok_or_else(|| Error::NotFound(format!("project '{}'", project_path)))?;

        projects.remove(index);
        self.repository.save_all(&projects).await?;
        info!(path = %project_path, "Project deleted");
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput("project name must not be empty".to_string()));
    }
    Ok(())
}

fn validate_bpm(bpm: &str) -> Result<()> {
    if bpm.trim().is_empty() {
        return Err(Error::InvalidInput("BPM must not be empty".to_string()));
    }
    match bpm.trim().parse::<i32>() {
        Ok(value) if value > 0 => Ok(()),
        _ => Err(Error::InvalidInput(format!(
            "BPM must be a number greater than 0, got '{}'",
            bpm
        ))),
    }
}
