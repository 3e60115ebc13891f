//! Results file declarations and path resolution

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::serialize::FileType;

pub const DEFAULT_TEMPLATE: &str = "{name}_{key}.{extension}";

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{|\}\}|\{([A-Za-z_]+)\}").expect("placeholder pattern is valid")
});

#[derive(Debug, Clone)]
pub struct FileDeclaration {
    pub key: String,
    pub file_type: FileType,
    pub template: Option<String>,
}

impl FileDeclaration {
    pub fn template(&self) -> &str {
        self.template.as_deref().unwrap_or(DEFAULT_TEMPLATE)
    }
}

#[derive(Debug, Clone)]
pub struct FigureDeclaration {
    pub key: String,
    pub template: String,
}

/// Ordered results and figure declarations
///
/// Registries only grow: [`FileRegistry::extend`] appends another registry's
/// declarations after the existing ones, duplicates included.
#[derive(Debug, Clone, Default)]
pub struct FileRegistry {
    results_files: Vec<FileDeclaration>,
    figure_files: Vec<FigureDeclaration>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: &str, file_type: impl Into<FileType>, template: Option<&str>) {
        self.results_files.push(FileDeclaration {
            key: key.to_string(),
            file_type: file_type.into(),
            template: template.map(str::to_string),
        });
    }

    pub fn register_figure(&mut self, key: &str, template: &str) {
        self.figure_files.push(FigureDeclaration {
            key: key.to_string(),
            template: template.to_string(),
        });
    }

    pub fn extend(&mut self, other: &FileRegistry) {
        self.results_files.extend(other.results_files.iter().cloned());
        self.figure_files.extend(other.figure_files.iter().cloned());
    }

    pub fn results_files(&self) -> &[FileDeclaration] {
        &self.results_files
    }

    pub fn figure_files(&self) -> &[FigureDeclaration] {
        &self.figure_files
    }

    /// Resolve every declaration to piece and merged paths
    ///
    /// Declarations are applied in order, so for a duplicated key the last one
    /// decides the file type and paths.
    pub fn resolve(&self, context: &ResolveContext<'_>) -> Result<ResolvedFiles> {
        let mut file_names = HashMap::new();
        let mut merged_file_names = HashMap::new();
        let mut file_types = HashMap::new();
        let mut figure_file_names = HashMap::new();

        for declaration in &self.results_files {
            let tail = render_template(
                declaration.template(),
                context.name,
                &declaration.key,
                Some(declaration.file_type.format.extension()),
            )?;
            file_names.insert(
                declaration.key.clone(),
                context.scratch_results_dir.join(&tail),
            );
            merged_file_names.insert(declaration.key.clone(), context.work_results_dir.join(&tail));
            file_types.insert(declaration.key.clone(), declaration.file_type.clone());
        }

        for figure in &self.figure_files {
            let tail = render_template(&figure.template, context.name, &figure.key, None)?;
            figure_file_names.insert(figure.key.clone(), context.work_results_dir.join(tail));
        }

        if context.merged {
            file_names = merged_file_names.clone();
        }

        Ok(ResolvedFiles {
            file_names,
            merged_file_names,
            file_types,
            figure_file_names,
        })
    }
}

pub struct ResolveContext<'a> {
    pub name: &'a str,
    pub scratch_results_dir: &'a Path,
    pub work_results_dir: &'a Path,
    pub merged: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedFiles {
    file_names: HashMap<String, PathBuf>,
    merged_file_names: HashMap<String, PathBuf>,
    file_types: HashMap<String, FileType>,
    figure_file_names: HashMap<String, PathBuf>,
}

impl ResolvedFiles {
    pub fn file_name(&self, key: &str) -> Result<&Path> {
        self.file_names
            .get(key)
            .map(PathBuf::as_path)
            .ok_or_else(|| Error::UnknownKey(key.to_string()))
    }

    pub fn merged_file_name(&self, key: &str) -> Result<&Path> {
        self.merged_file_names
            .get(key)
            .map(PathBuf::as_path)
            .ok_or_else(|| Error::UnknownKey(key.to_string()))
    }

    pub fn file_type(&self, key: &str) -> Result<&FileType> {
        self.file_types
            .get(key)
            .ok_or_else(|| Error::UnknownKey(key.to_string()))
    }

    pub fn figure_file_name(&self, key: &str) -> Result<&Path> {
        self.figure_file_names
            .get(key)
            .map(PathBuf::as_path)
            .ok_or_else(|| Error::UnknownKey(key.to_string()))
    }

    pub fn file_names(&self) -> &HashMap<String, PathBuf> {
        &self.file_names
    }

    pub fn merged_file_names(&self) -> &HashMap<String, PathBuf> {
        &self.merged_file_names
    }
}

/// Fill `{name}`, `{key}` and (when given) `{extension}` into a file name template
///
/// `{{` and `}}` stand for literal braces.
pub fn render_template(template: &str, name: &str, key: &str, extension: Option<&str>) -> Result<String> {
    let mut unknown = None;
    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures| {
        let Some(placeholder) = caps.get(1) else {
            return caps[0][..1].to_string();
        };
        match (placeholder.as_str(), extension) {
            ("name", _) => name.to_string(),
            ("key", _) => key.to_string(),
            ("extension", Some(extension)) => extension.to_string(),
            (other, _) => {
                unknown.get_or_insert_with(|| other.to_string());
                String::new()
            }
        }
    });

    match unknown {
        Some(placeholder) => Err(Error::config(format!(
            "unknown placeholder '{{{placeholder}}}' in file name template '{template}'"
        ))),
        None => Ok(rendered.into_owned()),
    }
}
