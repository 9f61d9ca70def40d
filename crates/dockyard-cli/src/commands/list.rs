//! Listing commands.

use super::ResolveOptions;
use anyhow::Result;
use dockyard_core::config::{ProfileConfig, Variable};

pub fn profiles(options: &ResolveOptions) -> Result<()> {
    let loader = options.open()?;
    let profiles = loader.profiles()?;
    if profiles.is_empty() {
        println!("No profiles defined");
        return Ok(());
    }
    for profile in &profiles {
        println!("{}", describe_profile(profile));
    }
    Ok(())
}

pub fn vars(options: &ResolveOptions) -> Result<()> {
    let loader = options.open()?;
    let vars = loader.variables()?;
    if vars.is_empty() {
        println!("No variables defined");
        return Ok(());
    }
    for var in &vars {
        println!("{}", describe_variable(var));
    }
    Ok(())
}

fn describe_profile(profile: &ProfileConfig) -> String {
    let parents: Vec<String> = profile
        .parent_entries()
        .into_iter()
        .map(|parent| match parent.source.as_ref().and_then(|s| s.git.as_ref().or(s.path.as_ref())) {
            Some(location) => format!("{}@{}", parent.profile, location),
            None => parent.profile,
        })
        .collect();
    if parents.is_empty() {
        profile.name.clone()
    } else {
        format!("{} (parents: {})", profile.name, parents.join(", "))
    }
}

fn describe_variable(var: &Variable) -> String {
    let mut line = format!("{} [{}]", var.name, var.source);
    match &var.default {
        Some(_) if var.password => line.push_str(" default: ******"),
        Some(default) => line.push_str(&format!(" default: {}", default.to_text())),
        None => {}
    }
    if let Some(question) = &var.question {
        line.push_str(&format!(" - {}", question));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockyard_core::Node;
    use dockyard_core::config::{ProfileParent, SourceConfig, VariableSource};

    #[test]
    fn test_describe_profile() {
        let profile = ProfileConfig {
            name: "prod".to_string(),
            parents: vec![
                ProfileParent {
                    source: None,
                    profile: "base".to_string(),
                },
                ProfileParent {
                    source: Some(SourceConfig {
                        path: Some("../shared".to_string()),
                        ..Default::default()
                    }),
                    profile: "remote".to_string(),
                },
            ],
            ..Default::default()
        };
        assert_eq!(
            describe_profile(&profile),
            "prod (parents: base, remote@../shared)"
        );
    }

    #[test]
    fn test_describe_variable() {
        let mut var = Variable::new("PORT");
        var.default = Some(Node::from(8080));
        var.source = VariableSource::Env;
        assert_eq!(describe_variable(&var), "PORT [env] default: 8080");

        var.password = true;
        assert_eq!(describe_variable(&var), "PORT [env] default: ******");
    }
}
