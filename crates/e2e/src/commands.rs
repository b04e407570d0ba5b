//! Custom commands: named macros of primitive steps
//!
//! `login` and `logout` are always available; suites can add their own
//! under `commands:`. Arguments are resolved in the caller's scope and
//! bound as locals while the macro's steps run.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{CadenceError, CadenceResult};
use crate::spec::{CommandDef, Locator, Step, StepKind, TargetStep, TypeStep};

#[derive(Debug, Clone)]
pub struct CommandRegistry {
    commands: BTreeMap<String, CommandDef>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl CommandRegistry {
    pub fn empty() -> Self {
        Self {
            commands: BTreeMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(
            "login",
            CommandDef {
                params: vec!["email".into(), "password".into()],
                steps: vec![
                    type_into(r#"input[name="email"]"#, "${email}"),
                    type_into(r#"input[name="password"]"#, "${password}"),
                    click(r#"button[type="submit"]"#),
                ],
            },
        );
        registry.register(
            "logout",
            CommandDef {
                params: Vec::new(),
                steps: vec![click(r#"button[data-testid="logout"]"#)],
            },
        );
        registry
    }

    /// Later registrations replace earlier ones with the same name.
    pub fn register(&mut self, name: impl Into<String>, def: CommandDef) {
        self.commands.insert(name.into(), def);
    }

    pub fn extend(&mut self, defs: &BTreeMap<String, CommandDef>) {
        for (name, def) in defs {
            self.register(name.clone(), def.clone());
        }
    }

    pub fn get(&self, name: &str) -> CadenceResult<&CommandDef> {
        self.commands
            .get(name)
            .ok_or_else(|| CadenceError::UnknownCommand(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    /// Check resolved arguments against the declared parameters.
    pub fn bind_args(
        name: &str,
        def: &CommandDef,
        args: BTreeMap<String, Value>,
    ) -> CadenceResult<BTreeMap<String, Value>> {
        if let Some(missing) = def.params.iter().find(|p| !args.contains_key(*p)) {
            return Err(CadenceError::InvalidStep(format!(
                "command `{}` needs argument `{}`",
                name, missing
            )));
        }
        if let Some(extra) = args.keys().find(|k| !def.params.contains(k)) {
            return Err(CadenceError::InvalidStep(format!(
                "command `{}` has no parameter `{}`",
                name, extra
            )));
        }
        Ok(args)
    }
}

fn type_into(selector: &str, text: &str) -> Step {
    Step::new(StepKind::Type(TypeStep {
        target: Locator::css(selector),
        text: text.to_string(),
    }))
}

fn click(selector: &str) -> Step {
    Step::new(StepKind::Click(TargetStep {
        target: Locator::css(selector),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtins_are_registered() {
        let registry = CommandRegistry::with_builtins();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["login", "logout"]);
        let login = registry.get("login").unwrap();
        assert_eq!(login.steps.len(), 3);
        assert!(matches!(registry.get("signup"), Err(CadenceError::UnknownCommand(_))));
    }

    #[test]
    fn arguments_must_match_params() {
        let registry = CommandRegistry::with_builtins();
        let login = registry.get("login").unwrap();

        let ok = CommandRegistry::bind_args(
            "login",
            login,
            BTreeMap::from([
                ("email".to_string(), json!("a@b.c")),
                ("password".to_string(), json!("pw")),
            ]),
        );
        assert!(ok.is_ok());

        let missing = CommandRegistry::bind_args(
            "login",
            login,
            BTreeMap::from([("email".to_string(), json!("a@b.c"))]),
        );
        assert!(missing.unwrap_err().to_string().contains("password"));
    }

    #[test]
    fn suite_commands_override() {
        let mut registry = CommandRegistry::with_builtins();
        registry.extend(&BTreeMap::from([(
            "logout".to_string(),
            CommandDef {
                params: vec![],
                steps: vec![click("a.sign-out")],
            },
        )]));
        let logout = registry.get("logout").unwrap();
        match &logout.steps[0].kind {
            StepKind::Click(t) => assert_eq!(t.target.selector, "a.sign-out"),
            other => panic!("unexpected step {:?}", other),
        }
    }
}
