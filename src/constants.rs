//! # Constants
//!
//! Shared constants used throughout the operator.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health checks
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default port for the mutating admission webhook
pub const DEFAULT_WEBHOOK_PORT: u16 = 8443;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default interval for the timed re-check of a converged gateway (seconds)
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 60;

/// Timeout applied to every outbound configuration or OIDC call (seconds)
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;

/// Fibonacci backoff floor for failed reconciliations (minutes)
pub const DEFAULT_BACKOFF_MIN_MINUTES: u64 = 1;

/// Fibonacci backoff ceiling for failed reconciliations (minutes)
pub const DEFAULT_BACKOFF_MAX_MINUTES: u64 = 10;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// In-cluster CA bundle appended to the system trust roots when present
pub const SERVICE_CA_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/service-ca.crt";

/// Prefix shared by operator labels and webhook annotations
pub const ANNOTATION_PREFIX: &str = "app-gateway.operator.dev/";

/// Template label carrying the config version of the rendered document
pub const CONFIG_VERSION_LABEL: &str = "app-gateway.operator.dev/configVersion";

/// Template label carrying the runtime language
pub const LANG_LABEL: &str = "app-gateway.operator.dev/lang";

/// Template label naming the generated ConfigMap
pub const CONFIG_MAP_LABEL: &str = "app-gateway.operator.dev/configMap";

/// Deployment annotation describing why the last rollout happened
pub const CHANGE_CAUSE_ANNOTATION: &str = "kubernetes.io/change-cause";

/// Data key holding the merged document in generated ConfigMaps
pub const CONFIG_DATA_KEY: &str = "config.yaml";

/// Suffix used for generated ConfigMap names when the resource does not set one
pub const DEFAULT_CONFIG_MAP_SUFFIX: &str = "-config-gateway-generated";

/// Mount path of the merged configuration inside the gateway container
pub const CONFIG_MOUNT_PATH: &str = "/var/gateway/config";

/// Health check script shipped in the gateway image
pub const HEALTH_CHECK_COMMAND: &str = "/sbin/health_check.sh";

/// Workload version label applied to rendered Deployments
pub const WORKLOAD_VERSION: &str = "v0.1";

/// Port exposed by the generated NodePort service
pub const GATEWAY_SERVICE_PORT: i32 = 8443;

/// Node port used when the service annotation cannot be parsed
pub const DEFAULT_NODE_PORT: i32 = 30443;

/// Container port of the injected sidecar
pub const SIDECAR_CONTAINER_PORT: i32 = 80;

/// Volume name used by the injected sidecar
pub const SIDECAR_VOLUME_NAME: &str = "app-gateway-config";

/// Namespaces the admission webhook never mutates
pub const IGNORED_NAMESPACES: [&str; 2] = ["kube-system", "kube-public"];

/// Field manager and event reporter name
pub const OPERATOR_NAME: &str = "app-gateway-operator";

/// Pod template annotation selecting the container `kubectl` attaches to
pub const DEFAULT_CONTAINER_ANNOTATION: &str = "kubectl.kubernetes.io/default-container";

/// Webhook annotation recording the generated Service
pub const SERVICE_NAME_ANNOTATION: &str = "app-gateway.operator.dev/serviceName";

/// Webhook annotation recording the generated ConfigMap
pub const CONFIG_MAP_NAME_ANNOTATION: &str = "app-gateway.operator.dev/configMapName";
