use std::time::Duration;

/// Capacity shared by the in-memory ingress buffer, each client's local
/// buffer, and each client's outbound queue.
pub const CHANNEL_SIZE: usize = 1024;

/// TTL applied to every cached list snapshot.
pub const CACHE_TTL_MINUTES: u64 = 30;

/// Stock avatar assigned to accounts that never uploaded one. The avatar
/// normalizer stores it verbatim instead of rewriting it to a `/static/` path.
pub const DEFAULT_AVATAR_URL: &str =
    "https://cube.elemecdn.com/0/88/03b0d39583f48206768a7534e55bcpng.png";

/// Informational frame sent right after a successful login.
pub const WELCOME_NOTICE: &str = "welcome to the chat server";

/// Informational frame sent when a client signs out.
pub const GOODBYE_NOTICE: &str = "signed out";

/// Informational frame sent when both the shared ingress buffer and the
/// client's local buffer are full and the event had to be dropped.
pub const OVERLOAD_NOTICE: &str =
    "too many messages are being sent right now, delivery failed, please retry shortly";

/// Grace given to in-flight connections before shutdown abandons them.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Consumer group used by the broker ingress reader.
pub const BROKER_CONSUMER_GROUP: &str = "chat";
