//! Stratagem catalog lookups and icon resolution

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use stratagem_config::{CatalogDef, Direction};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Unknown stratagem: '{0}'")]
    NotFound(String),
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stratagem {
    pub name: String,
    pub department: String,
    pub sequence: Vec<Direction>,
    icon: Option<PathBuf>,
}

/// Department name and the names of its stratagems, in catalog order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Department {
    pub name: String,
    pub stratagems: Vec<String>,
}

/// Read-only set of known stratagems.
#[derive(Debug, Clone, Default)]
pub struct MacroCatalog {
    stratagems: Vec<Stratagem>,
    by_name: HashMap<String, usize>,
    departments: Vec<Department>,
    icons_dir: Option<PathBuf>,
}

impl MacroCatalog {
    /// Build the catalog from a parsed definition.
    ///
    /// Names are unique after parsing, so no entry shadows another.
    pub fn from_def(def: CatalogDef) -> Self {
        let mut catalog = Self::default();

        for department in def.departments {
            let mut names = Vec::with_capacity(department.stratagems.len());
            for stratagem in department.stratagems {
                names.push(stratagem.name.clone());
                catalog
                    .by_name
                    .insert(stratagem.name.clone(), catalog.stratagems.len());
                catalog.stratagems.push(Stratagem {
                    name: stratagem.name,
                    department: department.name.clone(),
                    sequence: stratagem.sequence,
                    icon: stratagem.icon,
                });
            }
            catalog.departments.push(Department {
                name: department.name,
                stratagems: names,
            });
        }

        catalog
    }

    /// Directory searched for `<Name>.svg` icons.
    pub fn with_icons_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.icons_dir = Some(dir.into());
        self
    }

    pub fn len(&self) -> usize {
        self.stratagems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stratagems.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&Stratagem, CatalogError> {
        self.by_name
            .get(name)
            .map(|&index| &self.stratagems[index])
            .ok_or_else(|| CatalogError::NotFound(name.to_string()))
    }

    /// The ordered input sequence for `name`.
    pub fn get_sequence(&self, name: &str) -> Result<&[Direction], CatalogError> {
        self.get(name).map(|s| s.sequence.as_slice())
    }

    pub fn departments(&self) -> &[Department] {
        &self.departments
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stratagem> {
        self.stratagems.iter()
    }

    /// Case-insensitive substring search over names, in catalog order.
    pub fn search(&self, query: &str) -> Vec<&Stratagem> {
        let query = query.trim().to_lowercase();
        self.stratagems
            .iter()
            .filter(|s| query.is_empty() || s.name.to_lowercase().contains(&query))
            .collect()
    }

    /// Path of the icon to show for `name`, if one exists on disk.
    ///
    /// Tries the explicit `icon=` path, then `<dir>/<Name>.svg`, then
    /// `<dir>/<name_in_snake_case>.svg`.
    pub fn icon_path(&self, name: &str) -> Option<PathBuf> {
        let stratagem = self.get(name).ok()?;

        if let Some(icon) = &stratagem.icon {
            if icon.exists() {
                return Some(icon.clone());
            }
            tracing::debug!("Icon for '{}' not found at {}", name, icon.display());
        }

        let dir = self.icons_dir.as_deref()?;
        let snake = name.to_lowercase().replace(' ', "_");
        [name, snake.as_str()]
            .iter()
            .map(|stem| icon_candidate(dir, stem))
            .find(|path| path.exists())
    }
}

fn icon_candidate(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{}.svg", stem))
}
