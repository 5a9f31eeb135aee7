//! Classic builder output tracking
//!
//! The daemon streams `Step N/M : INSTRUCTION` lines followed by the output of
//! that instruction. The tracker remembers the current step so an error line
//! can be attributed to the recipe stage that produced it.

use crate::error::BuildError;
use crate::recipe::{BuildRecipe, Dockerfile, Stage};
use regex::Regex;
use std::sync::OnceLock;

fn step_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^Step (\d+)/(\d+) : (.*)$").expect("valid regex"))
}

/// A `Step N/M` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepHeader {
    pub index: usize,
    pub total: usize,
    pub instruction: String,
}

pub fn parse_step(line: &str) -> Option<StepHeader> {
    let caps = step_pattern().captures(line.trim_end())?;
    Some(StepHeader {
        index: caps[1].parse().ok()?,
        total: caps[2].parse().ok()?,
        instruction: caps[3].to_string(),
    })
}

pub struct BuildLogTracker<'a> {
    dockerfile: &'a Dockerfile,
    image: String,
    tool: String,
    current: Option<StepHeader>,
    tail: Vec<String>,
}

const TAIL_LINES: usize = 20;

impl<'a> BuildLogTracker<'a> {
    pub fn new(recipe: &BuildRecipe, dockerfile: &'a Dockerfile) -> Self {
        Self {
            dockerfile,
            image: recipe.base.image.clone(),
            tool: recipe.environment.tool.clone(),
            current: None,
            tail: Vec::new(),
        }
    }

    /// Feed one chunk of build output; returns a header when a new step begins
    pub fn observe(&mut self, chunk: &str) -> Option<StepHeader> {
        let mut started = None;
        for line in chunk.lines() {
            if let Some(header) = parse_step(line) {
                self.tail.clear();
                self.current = Some(header.clone());
                started = Some(header);
            } else if !line.trim().is_empty() {
                if self.tail.len() == TAIL_LINES {
                    self.tail.remove(0);
                }
                self.tail.push(line.to_string());
            }
        }
        started
    }

    pub fn current(&self) -> Option<&StepHeader> {
        self.current.as_ref()
    }

    /// Stage of the step running now; before the first header that is the base image
    pub fn current_stage(&self) -> Stage {
        self.current
            .as_ref()
            .and_then(|h| self.dockerfile.stage_of_step(h.index))
            .unwrap_or(Stage::BaseImage)
    }

    /// Translate a daemon error into the failure of the current stage
    pub fn fail(&self, message: &str) -> BuildError {
        let stage = self.current_stage();
        let subject = match stage {
            Stage::BaseImage => self.image.clone(),
            Stage::SourceCopy => ".".to_string(),
            _ => self.tool.clone(),
        };

        let mut reason = message.trim().to_string();
        if !self.tail.is_empty() && matches!(stage, Stage::ToolInstall | Stage::DependencyInstall) {
            reason = format!("{}\n{}", reason, self.tail.join("\n"));
        }

        BuildError::for_stage(stage, &subject, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::fixtures::sample_recipe;

    #[test]
    fn test_parse_step() {
        let header = parse_step("Step 5/9 : RUN python -m pip install --no-cache-dir uv\n").unwrap();
        assert_eq!(header.index, 5);
        assert_eq!(header.total, 9);
        assert!(header.instruction.starts_with("RUN python"));

        assert!(parse_step(" ---> Running in 1a2b3c").is_none());
    }

    #[test]
    fn test_pull_failure_before_first_step() {
        let recipe = sample_recipe();
        let dockerfile = Dockerfile::from_recipe(&recipe);
        let tracker = BuildLogTracker::new(&recipe, &dockerfile);

        let err = tracker.fail("pull access denied for python");
        assert!(matches!(err, BuildError::BaseImageUnavailable { ref image, .. } if image == "python:3.12-slim"));
    }

    #[test]
    fn test_dependency_failure_carries_output() {
        let recipe = sample_recipe();
        let dockerfile = Dockerfile::from_recipe(&recipe);
        let mut tracker = BuildLogTracker::new(&recipe, &dockerfile);

        assert!(tracker.observe("Step 1/9 : FROM python:3.12-slim\n").is_some());
        tracker.observe(" ---> abc123\n");
        tracker.observe("Step 8/9 : RUN uv sync\n");
        tracker.observe("error: No solution found when resolving dependencies\n");

        assert_eq!(tracker.current_stage(), Stage::DependencyInstall);
        let err = tracker.fail("The command '/bin/sh -c uv sync' returned a non-zero code: 1");
        match err {
            BuildError::DependencyResolution { tool, reason } => {
                assert_eq!(tool, "uv");
                assert!(reason.contains("No solution found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_tool_install_failure() {
        let recipe = sample_recipe();
        let dockerfile = Dockerfile::from_recipe(&recipe);
        let mut tracker = BuildLogTracker::new(&recipe, &dockerfile);

        tracker.observe("Step 5/9 : RUN python -m pip install --no-cache-dir uv\n");
        let err = tracker.fail("returned a non-zero code: 1");
        assert!(matches!(err, BuildError::ToolInstall { .. }));
    }
}
