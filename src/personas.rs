//! Persona definitions with specialised system prompts.
//!
//! A persona is a named system-prompt specialisation (Linux, Database, ...)
//! paired with generation defaults. Verbosity selects between a concise and a
//! detailed response budget.

use serde::{Deserialize, Serialize};

/// Available persona specialisations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    Linux,
    #[serde(rename = "python")]
    PythonDev,
    Devops,
    Database,
    General,
}

/// Response detail modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Quick,
    Full,
}

/// Generation defaults for a persona under a given verbosity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationDefaults {
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Persona {
    /// Parse a persona name as used on the `!expert` command line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "linux" => Some(Persona::Linux),
            "python" => Some(Persona::PythonDev),
            "devops" => Some(Persona::Devops),
            "database" => Some(Persona::Database),
            "general" => Some(Persona::General),
            _ => None,
        }
    }

    /// Display name, also used in the `[You are ...]` first-message tag.
    pub fn name(&self) -> &'static str {
        match self {
            Persona::Linux => "Linux Expert",
            Persona::PythonDev => "Python Expert",
            Persona::Devops => "DevOps Expert",
            Persona::Database => "Database Expert",
            Persona::General => "General Assistant",
        }
    }

    /// Lowercase identifier matching the CLI surface.
    pub fn id(&self) -> &'static str {
        match self {
            Persona::Linux => "linux",
            Persona::PythonDev => "python",
            Persona::Devops => "devops",
            Persona::Database => "database",
            Persona::General => "general",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Persona::Linux => "Shell, scripting, system administration",
            Persona::PythonDev => "Coding, debugging, best practices",
            Persona::Devops => "Docker, K8s, CI/CD, deployment",
            Persona::Database => "SQL, optimization, design",
            Persona::General => "Mixed capabilities",
        }
    }

    /// Default sampling temperature. Command-centric personas run cooler for
    /// more deterministic output.
    pub fn temperature(&self) -> f64 {
        match self {
            Persona::Linux | Persona::Devops | Persona::Database => 0.4,
            Persona::PythonDev => 0.5,
            Persona::General => 0.7,
        }
    }

    /// Max-token budget under the given verbosity.
    pub fn max_tokens(&self, verbosity: Verbosity) -> u32 {
        let (quick, full) = match self {
            Persona::Linux | Persona::Devops | Persona::Database => (400, 1500),
            Persona::PythonDev | Persona::General => (500, 2000),
        };
        match verbosity {
            Verbosity::Quick => quick,
            Verbosity::Full => full,
        }
    }

    /// Combined generation defaults.
    pub fn defaults(&self, verbosity: Verbosity) -> GenerationDefaults {
        GenerationDefaults {
            temperature: self.temperature(),
            max_tokens: self.max_tokens(verbosity),
        }
    }

    fn expert_prompt(&self) -> &'static str {
        match self {
            Persona::Linux => {
                "Linux system expert. Answer with Linux/bash commands ONLY.\n\
                 NO Python/Java/PowerShell unless asked.\n\
                 Focus: shell scripting, system utilities, file operations."
            }
            Persona::PythonDev => {
                "Python expert. Answer with Python code ONLY.\n\
                 NO bash/shell unless needed.\n\
                 Focus: Python 3.x, clean code, best practices."
            }
            Persona::Devops => {
                "DevOps expert. Focus on Docker, K8s, CI/CD, infrastructure.\n\
                 Prefer containers and automation over app code."
            }
            Persona::Database => {
                "Database expert. Provide SQL queries and DB solutions.\n\
                 Focus: queries, schema, optimization, indexes."
            }
            Persona::General => {
                "General AI assistant. Adapt to questions.\n\
                 Provide clear, accurate info."
            }
        }
    }

    fn reminder(&self) -> &'static str {
        match self {
            Persona::Linux => "LINUX MODE: Use bash/shell commands only.",
            Persona::PythonDev => "PYTHON MODE: Use Python code only.",
            Persona::Devops => "DEVOPS MODE: Focus on containers & infrastructure.",
            Persona::Database => "DATABASE MODE: Use SQL queries.",
            Persona::General => "GENERAL MODE: Adapt to context.",
        }
    }
}

impl Verbosity {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "quick" => Some(Verbosity::Quick),
            "full" => Some(Verbosity::Full),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Verbosity::Quick => "quick",
            Verbosity::Full => "full",
        }
    }

    fn style_instruction(&self) -> &'static str {
        match self {
            Verbosity::Quick => {
                "STYLE: Quick and concise. Get to the point. No long explanations."
            }
            Verbosity::Full => "STYLE: Detailed with examples and context when helpful.",
        }
    }
}

/// Command-formatting rules shared by every persona prompt.
const BASE_INSTRUCTIONS: &str = "When suggesting commands:\n\
    - Wrap in backticks: `command`\n\
    - Use code blocks for multi-line\n\
    - Brief explanation only\n\
    - Mention risks if critical";

/// Generate the full system prompt for a persona under a verbosity setting.
pub fn system_prompt(persona: Persona, verbosity: Verbosity) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        persona.expert_prompt(),
        verbosity.style_instruction(),
        BASE_INSTRUCTIONS,
        persona.reminder()
    )
}

/// All personas in menu order.
pub const ALL_PERSONAS: [Persona; 5] = [
    Persona::Linux,
    Persona::PythonDev,
    Persona::Devops,
    Persona::Database,
    Persona::General,
];
