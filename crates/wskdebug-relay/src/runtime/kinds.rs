// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runtime kinds known to the local debugger.

/// Standard runtime images per action kind.
///
/// Deployments may run other versions; `--image` overrides the table.
const IMAGES: &[(&str, &str)] = &[
    ("nodejs", "openwhisk/action-nodejs-v10:latest"),
    ("nodejs:default", "openwhisk/action-nodejs-v10:latest"),
    ("nodejs:6", "openwhisk/nodejs6action:latest"),
    ("nodejs:8", "openwhisk/action-nodejs-v8:latest"),
    ("nodejs:10", "openwhisk/action-nodejs-v10:latest"),
    ("nodejs:12", "openwhisk/action-nodejs-v12:latest"),
    ("python", "openwhisk/python2action:latest"),
    ("python:2", "openwhisk/python2action:latest"),
    ("python:3", "openwhisk/python3action:latest"),
    ("swift", "openwhisk/action-swift-v4.1:latest"),
    ("swift:3", "openwhisk/swift3action:latest"),
    ("swift:3.1.1", "openwhisk/action-swift-v3.1.1:latest"),
    ("swift:4.1", "openwhisk/action-swift-v4.1:latest"),
    ("swift:4.2", "openwhisk/action-swift-v4.2:latest"),
    ("java", "openwhisk/java8action:latest"),
    ("php:7.1", "openwhisk/action-php-v7.1:latest"),
    ("php:7.2", "openwhisk/action-php-v7.2:latest"),
    ("php:7.3", "openwhisk/action-php-v7.3:latest"),
    ("ruby:2.5", "openwhisk/action-ruby-v2.5:latest"),
    ("go:1.11", "openwhisk/actionloop-golang-v1.11:latest"),
    ("dotnet:2.2", "openwhisk/action-dotnet-v2.2:latest"),
    ("ballerina:0.990", "openwhisk/action-ballerina-v0.990.2:latest"),
    ("native", "openwhisk/dockerskeleton:latest"),
];

/// Kind that cannot be debugged without `--kind`.
pub const BLACKBOX: &str = "blackbox";

/// Debugger settings for a runtime family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugProfile {
    /// Debug port inside the container.
    pub port: u16,
    command: &'static str,
}

impl DebugProfile {
    /// Container command with the debugger listening on `internal_port`.
    pub fn command(&self, internal_port: u16) -> String {
        self.command.replace("{port}", &internal_port.to_string())
    }
}

const NODEJS: DebugProfile = DebugProfile {
    port: 9229,
    command: "node --expose-gc --inspect=0.0.0.0:{port} app.js",
};

/// Default image for a kind.
pub fn image_for_kind(kind: &str) -> Option<&'static str> {
    IMAGES.iter().find(|(k, _)| *k == kind).map(|(_, image)| *image)
}

/// Runtime family of a kind: `nodejs:10` → `nodejs`.
pub fn base_kind(kind: &str) -> &str {
    kind.split(':').next().unwrap_or(kind)
}

/// Debug profile for a kind's runtime family.
pub fn debug_profile(kind: &str) -> Option<DebugProfile> {
    match base_kind(kind) {
        "nodejs" => Some(NODEJS),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_lookup() {
        assert_eq!(
            image_for_kind("nodejs:12"),
            Some("openwhisk/action-nodejs-v12:latest")
        );
        assert_eq!(
            image_for_kind("nodejs"),
            image_for_kind("nodejs:default")
        );
        assert_eq!(image_for_kind("cobol:1"), None);
    }

    #[test]
    fn test_base_kind() {
        assert_eq!(base_kind("nodejs:10"), "nodejs");
        assert_eq!(base_kind("java"), "java");
    }

    #[test]
    fn test_nodejs_profile() {
        let profile = debug_profile("nodejs:8").unwrap();
        assert_eq!(profile.port, 9229);
        assert_eq!(
            profile.command(9229),
            "node --expose-gc --inspect=0.0.0.0:9229 app.js"
        );
        assert!(debug_profile("python:3").is_none());
    }
}
