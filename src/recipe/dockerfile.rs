//! Dockerfile rendering
//!
//! Each instruction remembers the stage it belongs to. The daemon reports
//! progress as `Step N/M`, and that number maps back to an instruction here,
//! which is how a failed build is attributed to a stage.

use super::{BuildRecipe, SearchPath, Stage};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub stage: Stage,
    pub text: String,
}

impl Instruction {
    fn new(stage: Stage, text: impl Into<String>) -> Self {
        Self {
            stage,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dockerfile {
    instructions: Vec<Instruction>,
}

impl Dockerfile {
    pub fn from_recipe(recipe: &BuildRecipe) -> Self {
        let workdir = recipe.workdir.as_str();
        let mut instructions = vec![
            Instruction::new(Stage::BaseImage, format!("FROM {}", recipe.base.image)),
            Instruction::new(Stage::SourceCopy, format!("WORKDIR {}", workdir)),
            Instruction::new(Stage::SourceCopy, format!("COPY . {}", workdir)),
        ];

        if !recipe.environment.env.is_empty() {
            let pairs = recipe
                .environment
                .env
                .iter()
                .map(|(k, v)| format!("{}={}", k, quote_env_value(v)))
                .collect::<Vec<_>>()
                .join(" ");
            instructions.push(Instruction::new(Stage::ToolInstall, format!("ENV {}", pairs)));
        }

        for step in &recipe.environment.steps {
            instructions.push(Instruction::new(step.stage, format!("RUN {}", step.shell_line())));
        }

        let venv_bin = recipe.venv_bin(Path::new(workdir));
        instructions.push(Instruction::new(
            Stage::SearchPath,
            format!(
                "ENV PATH={}",
                quote_env_value(&SearchPath::dockerfile_value(&venv_bin))
            ),
        ));

        instructions.push(Instruction::new(
            Stage::EntryPoint,
            format!("CMD {}", exec_form(&recipe.entrypoint.command)),
        ));

        Self { instructions }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Stage of the 1-based step number reported by the daemon
    pub fn stage_of_step(&self, step: usize) -> Option<Stage> {
        step.checked_sub(1)
            .and_then(|i| self.instructions.get(i))
            .map(|i| i.stage)
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Dockerfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Generated by venvpack")?;
        for instruction in &self.instructions {
            writeln!(f, "{}", instruction.text)?;
        }
        Ok(())
    }
}

fn exec_form(command: &[String]) -> String {
    serde_json::to_string(command).unwrap_or_else(|_| "[]".to_string())
}

fn quote_env_value(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
