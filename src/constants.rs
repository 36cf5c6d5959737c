// src/constants.rs

/// Name of the binary, used in usage lines.
pub const BIN_NAME: &str = "platgen";

/// The docker-compose source file that marks a platform root and from which
/// `docker-compose.yml` is rendered.
pub const COMPOSE_SOURCE_FILENAME: &str = "docker-compose.src.yml";

/// The rendered compose file consumed by `docker compose`.
pub const COMPOSE_FILENAME: &str = "docker-compose.yml";

/// The `.env`-style key/value file at the platform root.
pub const ENV_FILENAME: &str = ".env";

/// The optional project configuration file (inside `config/`).
pub const PROJECT_CONFIG_FILENAME: &str = "platgen.toml";

/// Directory names at the platform root.
pub const ASSETS_DIR: &str = "assets";
pub const CONFIG_DIR: &str = "config";
pub const DATA_DIR: &str = "data";
pub const NGINX_DIR: &str = "nginx";
pub const SERVICES_DIR: &str = "services";
pub const MOBILE_DIR: &str = "mobile";

/// How many parent directories the root finder may climb.
pub const MAX_ROOT_HOPS: usize = 20;

/// Default readiness markers emitted by the database init container.
pub const DEFAULT_ARM_MARKER: &str = "copying:";
pub const DEFAULT_READY_MARKER: &str = "config preparation complete";
pub const DEFAULT_STACK_TIMEOUT_SECS: u64 = 300;

/// Patch tags that the platform skeleton carries in its files.
pub const COMPOSE_SERVICE_TAG: &str = "# Insert service definitions #";
pub const NGINX_UPSTREAM_TAG: &str = "# Insert upstream routes #";
pub const TENANT_TAG: &str = "# Insert tenant Data #";
pub const SITE_USER_TAG: &str = "# Insert site_user Data #";
pub const ROUTE_INDEX_TAG: &str = "// Insert routes //";

/// Seed files (relative to `data/`).
pub const TENANT_SEED_FILENAME: &str = "seed/tenants.sql";
pub const SITE_USER_SEED_FILENAME: &str = "seed/site_users.sql";

/// The nginx site configuration (inside `nginx/`) that lists upstreams.
pub const NGINX_CONFIG_FILENAME: &str = "nginx.conf";

/// The first port handed out when no service port is configured yet.
pub const DEFAULT_SERVICE_PORT: u16 = 8081;

/// Route sources inside a service, relative to the service directory.
pub const ROUTES_DIR: &str = "src/routes";
