//! Global constants for gestured
//!
//! Timing defaults, bus naming and process exit codes.

// ============================================================================
// Timing Constants
// ============================================================================

/// Idle time without a keep-alive call before the service exits (ms)
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 10_000;

/// Upper bound for one blocking wait in the run loop (ms)
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 1_000;

/// Liveness is checked once every this many loop iterations
pub const DEFAULT_LIVENESS_CHECK_EVERY: u32 = 2;

// ============================================================================
// Bus Naming
// ============================================================================

/// Well-known bus name requested at startup
pub const BUS_NAME: &str = "org.aodenis.gestured";

/// Object path the service answers on
pub const OBJECT_PATH: &str = "/";

/// Service interface (StayAlive method, UpdateGesture signal)
pub const INTERFACE: &str = "org.aodenis.gestured";

/// Keep-alive method name
pub const METHOD_STAY_ALIVE: &str = "StayAlive";

/// Outbound gesture signal name
pub const SIGNAL_UPDATE_GESTURE: &str = "UpdateGesture";

/// Standard introspection interface and method
pub const INTROSPECTABLE_INTERFACE: &str = "org.freedesktop.DBus.Introspectable";
pub const METHOD_INTROSPECT: &str = "Introspect";

// ============================================================================
// Input
// ============================================================================

/// udev seat the libinput context is assigned to
pub const DEFAULT_SEAT: &str = "seat0";

// ============================================================================
// Exit Codes
// ============================================================================

/// Idle shutdown, or termination by signal
pub const EXIT_NORMAL: i32 = 0;

/// Poll/wait failure; also used for startup failures
pub const EXIT_POLL_FAILURE: i32 = 1;

/// Transport allocation or message failure
pub const EXIT_TRANSPORT_FAILURE: i32 = 2;

/// Outbound gesture signal could not be sent
pub const EXIT_SEND_FAILURE: i32 = 5;

/// Config path override
pub const CONFIG_PATH_ENV: &str = "GESTURED_CONFIG";

/// Default system-wide config path
pub const DEFAULT_CONFIG_PATH: &str = "/etc/gestured/config.toml";

/// Skip the root check (development on a readable seat)
pub const ALLOW_NONROOT_ENV: &str = "GESTURED_ALLOW_NONROOT";
