//! Workload containers launched on fabric nodes

use crate::error::{SystestError, SystestResult};
use crate::node::{output_of, Node};

use tracing::{debug, error, info};

pub const DEFAULT_IMAGE: &str = "alpine";
pub const DEFAULT_COMMAND: &str = "sleep 60m";

/// Description of a container to launch; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: Option<String>,
    pub command: Option<String>,
    pub network: Option<String>,
    pub service: Option<String>,
    pub name: Option<String>,
    pub dns_server: Option<String>,
    pub labels: Vec<String>,
}

impl ContainerSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn dns_server(mut self, server: impl Into<String>) -> Self {
        self.dns_server = Some(server.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    /// The `docker run` invocation for this spec
    ///
    /// The network argument is only emitted when a network name is set; the
    /// service name then takes its place, so a service without a network is
    /// dropped.
    pub fn build_run_command(&self) -> String {
        let mut command = String::from("docker run -itd");

        if let Some(name) = non_empty(&self.name) {
            command.push_str(&format!(" --name={}", name));
        }

        if let Some(network) = non_empty(&self.network) {
            let target = non_empty(&self.service).unwrap_or(network);
            command.push_str(&format!(" --net={}", target));
        }

        if let Some(dns) = non_empty(&self.dns_server) {
            command.push_str(&format!(" --dns={}", dns));
        }

        for label in self.labels.iter().filter(|l| !l.is_empty()) {
            command.push_str(&format!(" --label={}", label));
        }

        command.push(' ');
        command.push_str(non_empty(&self.image).unwrap_or(DEFAULT_IMAGE));
        command.push(' ');
        command.push_str(non_empty(&self.command).unwrap_or(DEFAULT_COMMAND));
        command
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Launch `spec` on `node`.
///
/// On failure, `docker logs` is fetched for whatever the run printed and
/// logged; the original error is returned either way.
pub async fn run(node: &Node, spec: ContainerSpec) -> SystestResult<Container<'_>> {
    let command = spec.build_run_command();
    info!("Starting container on {}: {}", node.name(), command);

    match node.run_single(&command).await {
        Ok(output) => {
            let id = output.trim().to_string();
            if id.is_empty() {
                return Err(SystestError::Parse {
                    node: node.name().to_string(),
                    output,
                });
            }
            Ok(Container {
                node,
                id,
                name: spec.name,
            })
        }
        Err(e) => {
            let reference = match &e {
                SystestError::CommandFailed { output, .. } => output.trim().to_string(),
                _ => String::new(),
            };
            if !reference.is_empty() {
                match node.run_foreground(&format!("docker logs {}", reference)).await {
                    Ok(logs) => error!("Container logs on {}: {}", node.name(), logs),
                    Err(log_err) => debug!("Could not fetch container logs: {}", log_err),
                }
            }
            Err(e)
        }
    }
}

/// A running container, valid for the current test case
#[derive(Debug)]
pub struct Container<'a> {
    node: &'a Node,
    id: String,
    name: Option<String>,
}

impl<'a> Container<'a> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn node(&self) -> &'a Node {
        self.node
    }

    /// The container's address on its first attached network
    pub async fn ip_address(&self) -> SystestResult<String> {
        let command = format!(
            "docker inspect --format '{}' {}",
            "{{range .NetworkSettings.Networks}}{{.IPAddress}}{{end}}", self.id
        );
        let out = self.node.run_foreground(&command).await?;
        let address = out.trim();
        if address.is_empty() {
            return Err(SystestError::Parse {
                node: self.node.name().to_string(),
                output: out,
            });
        }
        Ok(address.to_string())
    }

    /// Run a command inside the container
    pub async fn exec(&self, command: &str) -> SystestResult<String> {
        self.node
            .run_foreground(&format!("docker exec {} {}", self.id, command))
            .await
    }

    /// Ping `address` from inside the container
    pub async fn check_ping(&self, address: &str) -> SystestResult<()> {
        let command = format!("ping -c 1 {}", address);
        let result = self.exec(&command).await;
        let failed = result.is_err();
        let out = output_of(result)?;
        if failed || out.contains("100% packet loss") {
            return Err(SystestError::command_failed(
                self.node.name(),
                command,
                None,
                out,
            ));
        }
        Ok(())
    }

    pub async fn kill(&self) -> SystestResult<()> {
        self.node
            .run_foreground(&format!("docker kill -s 9 {}", self.id))
            .await
            .map(|_| ())
    }

    pub async fn remove(self) -> SystestResult<()> {
        self.node
            .run_foreground(&format!("docker rm -f {}", self.id))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abstractions::{MockCommandRunner, MockResponse};
    use crate::config::{TestbedKind, TimingConfig};
    use pretty_assertions::assert_eq;

    fn node(runner: &MockCommandRunner) -> Node {
        Node::new(Box::new(runner.clone()), TestbedKind::Vagrant, &TimingConfig::immediate())
    }

    #[test]
    fn test_defaults() {
        assert_eq!(
            ContainerSpec::new().build_run_command(),
            "docker run -itd alpine sleep 60m"
        );
    }

    #[test]
    fn test_full_spec() {
        let spec = ContainerSpec::new()
            .name("web1")
            .network("private")
            .dns_server("10.1.1.3")
            .label("app=web")
            .label("tier=front")
            .image("nginx")
            .command("nginx -g 'daemon off;'");
        assert_eq!(
            spec.build_run_command(),
            "docker run -itd --name=web1 --net=private --dns=10.1.1.3 \
             --label=app=web --label=tier=front nginx nginx -g 'daemon off;'"
        );
    }

    #[test]
    fn test_service_replaces_network() {
        let spec = ContainerSpec::new().network("private").service("web");
        assert_eq!(
            spec.build_run_command(),
            "docker run -itd --net=web alpine sleep 60m"
        );
    }

    #[test]
    fn test_service_without_network_is_ignored() {
        let spec = ContainerSpec::new().service("web");
        assert_eq!(
            spec.build_run_command(),
            "docker run -itd alpine sleep 60m"
        );
    }

    #[tokio::test]
    async fn test_run_returns_handle() {
        let runner = MockCommandRunner::new("node1");
        runner.expect("docker run", MockResponse::output("3f2a9c\n"));
        let node = node(&runner);

        let container = run(&node, ContainerSpec::new().name("c1")).await.unwrap();
        assert_eq!(container.id(), "3f2a9c");
        assert_eq!(container.name(), Some("c1"));
    }

    #[tokio::test]
    async fn test_failed_run_fetches_logs_and_returns_original_error() {
        let runner = MockCommandRunner::new("node1");
        runner
            .expect("docker run", MockResponse::fail_with(125, "deadbeef"))
            .expect("docker logs", MockResponse::output("network not found"));
        let node = node(&runner);

        let err = run(&node, ContainerSpec::new()).await.unwrap_err();
        assert!(matches!(
            err,
            SystestError::CommandFailed {
                exit_code: Some(125),
                ..
            }
        ));
        assert_eq!(runner.count("docker logs deadbeef"), 1);
    }

    #[tokio::test]
    async fn test_run_is_attempted_once_on_dropped_session() {
        let runner = MockCommandRunner::new("node1");
        runner
            .expect_times("docker run", 1, MockResponse::transport("ssh: unexpected EOF"))
            .expect("docker run", MockResponse::output("abc"));
        let node = node(&runner);

        let err = run(&node, ContainerSpec::new()).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(runner.count("docker run"), 1);
    }

    #[tokio::test]
    async fn test_container_ip_address() {
        let runner = MockCommandRunner::new("node1");
        runner
            .expect("docker run", MockResponse::output("abc"))
            .expect("docker inspect", MockResponse::output("10.1.1.5\n"));
        let node = node(&runner);

        let container = run(&node, ContainerSpec::new()).await.unwrap();
        assert_eq!(container.ip_address().await.unwrap(), "10.1.1.5");
        assert!(runner.commands()[1].ends_with(" abc"));
    }

    #[tokio::test]
    async fn test_kill_then_remove() {
        let runner = MockCommandRunner::new("node1");
        runner.expect("docker run", MockResponse::output("abc\n"));
        let node = node(&runner);

        let container = run(&node, ContainerSpec::new().name("web")).await.unwrap();
        assert_eq!(container.name(), Some("web"));
        container.kill().await.unwrap();
        container.remove().await.unwrap();

        let commands = runner.commands();
        assert_eq!(commands[1], "docker kill -s 9 abc");
        assert_eq!(commands[2], "docker rm -f abc");
    }
}
