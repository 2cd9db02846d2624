//! Recipe catalogue
//!
//! Holds the built-in recipes plus any loaded from RON files at runtime.
//!
//! ```ron
//! (
//!     id: "sweep_v1",
//!     safety_limits: [MaxDuty(30), MaxRuntime(2.0), MaxCurrent(6.5)],
//!     steps: [
//!         Duty(channel: M1, duty: 30, duration_ms: 500, sample: ["motor1_current", "encoder1"]),
//!         Hold(duration_ms: 250, sample: ["battery_voltage"]),
//!     ],
//! )
//! ```

use std::fs;
use std::io;
use std::path::Path;

use super::{Recipe, SafetyLimit, SafetyLimits, Step};
use crate::device::Channel;
use crate::error::Error;

/// Id of the shipped smoke test
pub const SMOKE_V1: &str = "smoke_v1";

/// Error type for recipe catalogue operations
#[derive(Debug, thiserror::Error)]
pub enum RecipeBookError {
    /// I/O error reading files
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// RON parsing error
    #[error("parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// Recipe failed validation
    #[error("{0}")]
    Invalid(#[from] Error),
}

impl From<RecipeBookError> for Error {
    fn from(e: RecipeBookError) -> Self {
        match e {
            RecipeBookError::Invalid(e) => e,
            other => Error::invalid(format!("cannot load recipes: {}", other)),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct RecipeDef {
    id: String,
    #[serde(default)]
    safety_limits: Vec<SafetyLimit>,
    steps: Vec<Step>,
}

/// Known recipes, in load order
#[derive(Debug, Clone)]
pub struct RecipeBook {
    recipes: Vec<Recipe>,
}

impl Default for RecipeBook {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RecipeBook {
    /// Catalogue holding only the shipped recipes
    pub fn builtin() -> Self {
        Self {
            recipes: vec![smoke_v1()],
        }
    }

    /// Load one recipe from a RON file
    pub fn load_file(&mut self, path: &Path) -> Result<usize, RecipeBookError> {
        let content = fs::read_to_string(path)?;
        self.load_ron(&content)
    }

    /// Load one recipe from a RON string
    pub fn load_ron(&mut self, content: &str) -> Result<usize, RecipeBookError> {
        let def: RecipeDef = ron::from_str(content)?;
        let recipe = Recipe::new(def.id, def.steps, def.safety_limits)?;
        if self.get(recipe.id()).is_some() {
            return Err(Error::invalid(format!("recipe {} is already defined", recipe.id())).into());
        }
        log::debug!("Loaded recipe {}", recipe.id());
        self.recipes.push(recipe);
        Ok(1)
    }

    /// Load all `.ron` files from a directory, in file-name order
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, RecipeBookError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "ron") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut total = 0;
        for path in paths {
            total += self.load_file(&path)?;
        }
        Ok(total)
    }

    /// Load from a file or every `.ron` file in a directory
    pub fn load_path(&mut self, path: &Path) -> Result<usize, RecipeBookError> {
        if path.is_dir() {
            self.load_dir(path)
        } else {
            self.load_file(path)
        }
    }

    /// Find a recipe by id
    pub fn get(&self, id: &str) -> Option<&Recipe> {
        self.recipes.iter().find(|r| r.id() == id)
    }

    /// Find a recipe by id, failing with `InvalidInput` when unknown
    pub fn resolve(&self, id: &str) -> crate::error::Result<&Recipe> {
        self.get(id)
            .ok_or_else(|| Error::invalid(format!("unsupported recipe: {}", id)))
    }

    /// All recipes
    pub fn iter(&self) -> impl Iterator<Item = &Recipe> {
        self.recipes.iter()
    }

    /// Number of recipes
    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    /// Whether the catalogue is empty
    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

fn smoke_v1() -> Recipe {
    let sample = || {
        vec![
            "battery_voltage".to_string(),
            "motor1_current".to_string(),
            "encoder1".to_string(),
        ]
    };
    let steps = vec![
        Step::Duty {
            channel: Channel::M1,
            duty: 20,
            duration_ms: 200,
            sample: sample(),
        },
        Step::Duty {
            channel: Channel::M1,
            duty: -20,
            duration_ms: 200,
            sample: sample(),
        },
    ];
    Recipe {
        id: SMOKE_V1.to_string(),
        steps,
        safety_limits: SafetyLimits(vec![
            SafetyLimit::MaxDuty(20),
            SafetyLimit::MaxRuntime(2.0),
            SafetyLimit::MaxCurrent(5.0),
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_builtin_smoke_v1() {
        let book = RecipeBook::builtin();
        let recipe = book.resolve(SMOKE_V1).unwrap();
        assert_eq!(recipe.steps().len(), 2);
        assert_eq!(recipe.scheduled_duration(), Duration::from_millis(400));
        let names: Vec<_> = recipe.safety_limits().iter().map(|l| l.name()).collect();
        assert_eq!(names, ["max_duty", "max_runtime_s", "max_current"]);
        assert!(book.resolve("smoke_v2").is_err());

        let revalidated = Recipe::new(
            SMOKE_V1,
            recipe.steps().to_vec(),
            recipe.safety_limits().iter().copied().collect(),
        )
        .unwrap();
        assert_eq!(&revalidated, recipe);
    }

    #[test]
    fn test_load_ron() {
        let ron = r#"
        (
            id: "sweep_v1",
            safety_limits: [MaxDuty(30), MaxRuntime(2.0), MinBatteryVoltage(10.5)],
            steps: [
                Duty(channel: M2, duty: -30, duration_ms: 500, sample: ["motor2_current"]),
                Velocity(channel: M1, speed: 1200, duration_ms: 300, sample: ["speed1"]),
                Hold(duration_ms: 250, sample: ["battery_voltage"]),
            ],
        )
        "#;

        let mut book = RecipeBook::builtin();
        assert_eq!(book.load_ron(ron).unwrap(), 1);
        assert_eq!(book.len(), 2);

        let recipe = book.get("sweep_v1").unwrap();
        assert_eq!(recipe.steps().len(), 3);
        assert_eq!(
            recipe.steps()[1],
            Step::Velocity {
                channel: Channel::M1,
                speed: 1200,
                duration_ms: 300,
                sample: vec!["speed1".into()],
            }
        );
        assert_eq!(recipe.safety_limits().len(), 3);
    }

    #[test]
    fn test_rejects_invalid_and_duplicate_recipes() {
        let mut book = RecipeBook::builtin();
        let dup = r#"(id: "smoke_v1", steps: [Hold(duration_ms: 10, sample: ["encoder1"])])"#;
        assert!(matches!(book.load_ron(dup), Err(RecipeBookError::Invalid(_))));

        let bad = r#"(id: "x", steps: [Hold(duration_ms: 0, sample: ["encoder1"])])"#;
        assert!(matches!(book.load_ron(bad), Err(RecipeBookError::Invalid(_))));

        assert!(matches!(book.load_ron("(id: "), Err(RecipeBookError::Parse(_))));
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_rejects_runtime_limit_beyond_duration_range() {
        let mut book = RecipeBook::builtin();
        let huge = r#"(
            id: "x",
            safety_limits: [MaxRuntime(1e30)],
            steps: [Hold(duration_ms: 10, sample: ["encoder1"])],
        )"#;
        match book.load_ron(huge) {
            Err(RecipeBookError::Invalid(e)) => {
                assert_eq!(e.kind(), crate::error::ErrorKind::InvalidInput)
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert!(book.get("x").is_none());
    }
}
