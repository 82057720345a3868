//! Machine-readable registry of every command, derived from the clap tree.

use crate::cli::output::Output;
use crate::cli::Cli;
use crate::errors::Result;
use clap::{Arg, ArgAction, Command, CommandFactory};
use serde::Serialize;

const HIDDEN_ARGS: [&str; 4] = ["help", "version", "verbose", "no_color"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArgSpec {
    pub name: String,
    pub required: bool,
    pub multiple: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlagSpec {
    pub long: String,
    pub short: Option<char>,
    pub description: String,
    pub takes_value: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    /// Full invocation path without the binary, e.g. `stack submit`
    pub name: String,
    pub args: Vec<ArgSpec>,
    pub description: String,
    pub category: String,
    pub aliases: Vec<String>,
    pub flags: Vec<FlagSpec>,
}

fn visible(arg: &Arg) -> bool {
    !arg.is_hide_set() && !HIDDEN_ARGS.contains(&arg.get_id().as_str())
}

fn spec_for(cmd: &Command, name: String, category: &str) -> CommandSpec {
    let args = cmd
        .get_arguments()
        .filter(|a| a.is_positional() && visible(a))
        .map(|a| ArgSpec {
            name: a.get_id().to_string(),
            required: a.is_required_set(),
            multiple: matches!(a.get_action(), ArgAction::Append),
        })
        .collect();

    let flags = cmd
        .get_arguments()
        .filter(|a| !a.is_positional() && visible(a))
        .filter_map(|a| {
            Some(FlagSpec {
                long: a.get_long()?.to_string(),
                short: a.get_short(),
                description: a.get_help().map(|h| h.to_string()).unwrap_or_default(),
                takes_value: a.get_action().takes_values(),
            })
        })
        .collect();

    CommandSpec {
        name,
        args,
        description: cmd.get_about().map(|s| s.to_string()).unwrap_or_default(),
        category: category.to_string(),
        aliases: cmd.get_visible_aliases().map(str::to_string).collect(),
        flags,
    }
}

fn collect(cmd: &Command, prefix: &str, category: &str, out: &mut Vec<CommandSpec>) {
    for sub in cmd.get_subcommands() {
        if sub.get_name() == "help" {
            continue;
        }
        let name = if prefix.is_empty() {
            sub.get_name().to_string()
        } else {
            format!("{prefix} {}", sub.get_name())
        };
        let category = if category.is_empty() {
            sub.get_name()
        } else {
            category
        };

        let has_children = sub.get_subcommands().any(|c| c.get_name() != "help");
        if !has_children || !sub.is_subcommand_required_set() {
            out.push(spec_for(sub, name.clone(), category));
        }
        if has_children {
            collect(sub, &name, category, out);
        }
    }
}

/// Every invocable command, in declaration order
pub fn command_registry() -> Vec<CommandSpec> {
    let mut out = Vec::new();
    collect(&Cli::command(), "", "", &mut out);
    out
}

pub fn run(category: Option<&str>) -> Result<()> {
    let registry: Vec<CommandSpec> = command_registry()
        .into_iter()
        .filter(|c| category.map_or(true, |cat| c.category == cat))
        .collect();
    Output::json(&registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(name: &str) -> CommandSpec {
        command_registry()
            .into_iter()
            .find(|c| c.name == name)
            .unwrap_or_else(|| panic!("{name} missing from registry"))
    }

    #[test]
    fn test_groups_are_not_listed_as_commands() {
        let names: Vec<String> = command_registry().into_iter().map(|c| c.name).collect();
        assert!(!names.contains(&"workspace".to_string()));
        assert!(names.contains(&"workspace add".to_string()));
        // `resolve` runs on its own as well as through its subcommands
        assert!(names.contains(&"resolve".to_string()));
        assert!(names.contains(&"resolve start".to_string()));
    }

    #[test]
    fn test_spec_carries_args_flags_and_aliases() {
        let remove = find("workspace remove");
        assert_eq!(remove.category, "workspace");
        assert_eq!(remove.aliases, vec!["rm"]);
        assert_eq!(remove.args.len(), 1);
        assert!(remove.args[0].required);
        let longs: Vec<&str> = remove.flags.iter().map(|f| f.long.as_str()).collect();
        assert_eq!(longs, vec!["force", "yes"]);
        assert!(!remove.flags[0].takes_value);

        let focus_add = find("focus add");
        assert!(focus_add.args[0].multiple);

        let merge = find("stack merge");
        assert!(merge.flags.iter().any(|f| f.long == "method" && f.takes_value));
    }
}
