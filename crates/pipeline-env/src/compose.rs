// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `docker compose` command construction.

use std::path::PathBuf;

use crate::command::CommandSpec;
use crate::config::Config;

/// Builds `docker compose` invocations for one project.
#[derive(Debug, Clone, Default)]
pub struct Compose {
    file: Option<PathBuf>,
    project: Option<String>,
}

impl Compose {
    /// Compose project described by the controller configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            file: config.compose_file.clone(),
            project: config.compose_project.clone(),
        }
    }

    fn base(&self) -> CommandSpec {
        let mut spec = CommandSpec::new("docker").arg("compose");
        if let Some(file) = &self.file {
            spec = spec.arg("-f").arg(file.to_string_lossy());
        }
        if let Some(project) = &self.project {
            spec = spec.arg("-p").arg(project);
        }
        spec
    }

    /// `up -d` for the given services, or every service when empty.
    pub fn up(&self, services: &[&str]) -> CommandSpec {
        self.base().args(["up", "-d"]).args(services.iter().copied())
    }

    /// Run a profile-scoped one-shot service in the foreground.
    pub fn run_once(&self, profile: &str, service: &str) -> CommandSpec {
        self.base()
            .args(["--profile", profile, "run", "--rm", service])
            .interactive()
    }

    /// Stop containers without removing them.
    pub fn stop(&self, services: &[&str]) -> CommandSpec {
        self.base().arg("stop").args(services.iter().copied())
    }

    /// Stop and remove every container of the project.
    pub fn down(&self) -> CommandSpec {
        self.base().arg("down")
    }

    /// Run `command` inside a running service without a TTY.
    ///
    /// Variables in `env` are forwarded by name only (`-e KEY`), their values
    /// travel through the docker client's environment and never appear on
    /// the command line.
    pub fn exec(&self, service: &str, env: &[(&str, &str)], command: &[&str]) -> CommandSpec {
        let mut spec = self.base().args(["exec", "-T"]);
        for (key, value) in env {
            spec = spec.arg("-e").arg(*key).env(*key, *value);
        }
        spec.arg(service).args(command.iter().copied())
    }
}
