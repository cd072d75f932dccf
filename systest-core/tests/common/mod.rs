// Common helpers for cluster-level integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use systest_core::abstractions::{Invocation, Journal, MockCommandRunner, MockControlPlane};
use systest_core::config::{SuiteConfig, TestbedKind};
use systest_core::node::{PLUGIN_PROCESS, MASTER_PROCESS};
use systest_core::{Cluster, Node};

/// A cluster of scripted nodes sharing one command journal
pub struct TestCluster {
    pub cluster: Cluster,
    pub runners: Vec<MockCommandRunner>,
    pub control_plane: MockControlPlane,
    pub journal: Journal,
}

impl TestCluster {
    /// Fabric nodes named `netplugin-node1..=count` whose plugin and master
    /// behave like real processes
    pub fn new(count: usize, config: SuiteConfig, control_plane: MockControlPlane) -> Self {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let runners: Vec<_> = (1..=count)
            .map(|i| {
                let runner = MockCommandRunner::with_journal(
                    format!("netplugin-node{}", i),
                    Arc::clone(&journal),
                );
                runner.track_process(PLUGIN_PROCESS).track_process(MASTER_PROCESS);
                runner
            })
            .collect();

        let nodes = runners
            .iter()
            .map(|r| Node::new(Box::new(r.clone()), TestbedKind::Vagrant, &config.timing))
            .collect();

        let cluster = Cluster::new(config, nodes, Box::new(control_plane.clone()))
            .expect("valid test cluster");

        Self {
            cluster,
            runners,
            control_plane,
            journal,
        }
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.journal.lock().clone()
    }

    /// Position of the first journal entry on `node` containing `needle`
    pub fn first(&self, node: &str, needle: &str) -> usize {
        self.invocations()
            .iter()
            .position(|i| i.node == node && i.command.contains(needle))
            .unwrap_or_else(|| panic!("{} never ran '{}'", node, needle))
    }

    /// Positions of every journal entry containing `needle`, on any node
    pub fn all(&self, needle: &str) -> Vec<usize> {
        self.invocations()
            .iter()
            .enumerate()
            .filter(|(_, i)| i.command.contains(needle))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Commands containing `needle`, on any node, in order
    pub fn commands_matching(&self, needle: &str) -> Vec<String> {
        self.invocations()
            .into_iter()
            .filter(|i| i.command.contains(needle))
            .map(|i| i.command)
            .collect()
    }
}
