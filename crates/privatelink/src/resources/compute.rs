//! Compute nodes and their boot-time bootstrap.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Reference, ResourceId, ResourceKind};
use crate::error::DeclarationError;

/// A machine image resolved per region from a fixed catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineImage {
    /// Region name to image id.
    pub by_region: BTreeMap<String, String>,
}

impl MachineImage {
    /// Image id for `region`.
    #[must_use]
    pub fn resolve(&self, region: &str) -> Option<&str> {
        self.by_region.get(region).map(String::as_str)
    }
}

/// Ordered shell commands run once at first boot.
///
/// Execution is fire-and-forget: nothing about the outcome flows back into
/// the declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartupScript {
    /// Interpreter line, e.g. `#!/bin/bash`.
    pub shebang: String,
    /// Commands in execution order.
    pub commands: Vec<String>,
}

impl StartupScript {
    /// A bash script with no commands yet.
    #[must_use]
    pub fn bash() -> Self {
        Self {
            shebang: "#!/bin/bash".to_string(),
            commands: Vec::new(),
        }
    }

    /// Append commands.
    #[must_use]
    pub fn with_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands.extend(commands.into_iter().map(Into::into));
        self
    }

    /// Render the user-data document.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(
            self.shebang.len() + self.commands.iter().map(|c| c.len() + 1).sum::<usize>() + 1,
        );
        out.push_str(&self.shebang);
        out.push('\n');
        for command in &self.commands {
            out.push_str(command);
            out.push('\n');
        }
        out
    }
}

/// A virtual machine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeNode {
    /// Resource id.
    pub id: ResourceId,
    /// Owning network.
    pub network: ResourceId,
    /// Size class, e.g. `t2.small`.
    pub instance_type: String,
    /// Boot image.
    pub image: MachineImage,
    /// Identity grant the instance runs as.
    pub identity: ResourceId,
    /// Attached groups, all in `network`.
    pub groups: Vec<ResourceId>,
    /// Optional first-boot script.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup_script: Option<StartupScript>,
}

impl ComputeNode {
    pub(crate) fn references(&self) -> Vec<Reference> {
        let mut refs = vec![
            Reference::dependency("network", &self.network, ResourceKind::NetworkSpace),
            Reference::dependency("identity", &self.identity, ResourceKind::IdentityGrant),
        ];
        refs.extend(self.groups.iter().enumerate().map(|(i, g)| {
            Reference::local(format!("groups[{i}]"), g, ResourceKind::AccessControlGroup)
        }));
        refs
    }

    pub(crate) fn validate(&self) -> Result<(), DeclarationError> {
        if self.instance_type.trim().is_empty() {
            return Err(DeclarationError::invalid_field(
                &self.id,
                "instance_type",
                "must not be empty",
            ));
        }
        if self.image.by_region.is_empty() {
            return Err(DeclarationError::invalid_field(
                &self.id,
                "image",
                "no region mapped to an image",
            ));
        }
        super::require_non_empty(&self.id, "groups", &self.groups)?;
        if let Some(script) = &self.startup_script {
            if !script.shebang.starts_with("#!") {
                return Err(DeclarationError::invalid_field(
                    &self.id,
                    "startup_script.shebang",
                    "must start with '#!'",
                ));
            }
            if let Some(i) = script.commands.iter().position(|c| c.contains('\n')) {
                return Err(DeclarationError::invalid_field(
                    &self.id,
                    format!("startup_script.commands[{i}]"),
                    "command must be a single line",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_script() {
        let script = StartupScript::bash().with_commands(["dnf update -y", "systemctl start httpd"]);
        assert_eq!(
            script.render(),
            "#!/bin/bash\ndnf update -y\nsystemctl start httpd\n"
        );
    }

    #[test]
    fn test_image_resolve() {
        let image = MachineImage {
            by_region: BTreeMap::from([("ap-northeast-1".to_string(), "ami-123".to_string())]),
        };
        assert_eq!(image.resolve("ap-northeast-1"), Some("ami-123"));
        assert_eq!(image.resolve("us-east-1"), None);
    }

    #[test]
    fn test_multiline_command_rejected() {
        let node = ComputeNode {
            id: "vm".into(),
            network: "net".into(),
            instance_type: "t2.small".into(),
            image: MachineImage {
                by_region: BTreeMap::from([("r".to_string(), "ami-1".to_string())]),
            },
            identity: "role".into(),
            groups: vec!["sg".into()],
            startup_script: Some(StartupScript::bash().with_commands(["echo a\necho b"])),
        };
        assert!(matches!(
            node.validate(),
            Err(DeclarationError::InvalidField { ref field, .. }) if field == "startup_script.commands[0]"
        ));
    }
}
