//! Maps upstream error messages to a user-facing sentence and a status code.

/// Sentence shown when no category matches.
pub const GENERIC_FAILURE: &str = "죄송합니다. 응답 처리 중 문제가 발생했습니다.";

const TIMEOUT: &str = "응답 시간이 초과되었습니다. 잠시 후 다시 시도해주세요.";
const RATE_LIMITED: &str = "요청이 많아 잠시 대기 중입니다. 잠시 후 다시 시도해주세요.";
const SERVER_ERROR: &str = "서버 오류로 응답이 중단되었습니다. 잠시 후 다시 시도해주세요.";
const NETWORK_ERROR: &str = "네트워크 오류로 응답이 중단되었습니다. 연결 상태를 확인해 주세요.";

/// User-facing rendering of a failed run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MappedRunError {
    pub text: &'static str,
    pub status: &'static str,
}

struct Category {
    needles: &'static [&'static str],
    text: &'static str,
    status: &'static str,
}

/// Ordered; the first category with a matching substring wins.
const CATEGORIES: &[Category] = &[
    Category {
        needles: &["timeout", "timed out", "deadline"],
        text: TIMEOUT,
        status: "timeout",
    },
    Category {
        needles: &["rate limit", "429"],
        text: RATE_LIMITED,
        status: "retry",
    },
    Category {
        needles: &["internal", "500"],
        text: SERVER_ERROR,
        status: "server_error",
    },
    Category {
        needles: &["socket", "network", "connection", "connect"],
        text: NETWORK_ERROR,
        status: "network_error",
    },
];

/// Maps a `RUN_ERROR` message, case-insensitively.
pub fn map_run_error(message: &str) -> MappedRunError {
    let lower = message.to_lowercase();
    CATEGORIES
        .iter()
        .find(|category| category.needles.iter().any(|n| lower.contains(n)))
        .map(|category| MappedRunError {
            text: category.text,
            status: category.status,
        })
        .unwrap_or(MappedRunError {
            text: GENERIC_FAILURE,
            status: "error",
        })
}

/// Sentence for a fatal transport failure (the stream itself broke, as
/// opposed to the agent reporting an error).
///
/// Only timeouts and network trouble get a dedicated sentence.
pub fn map_transport_failure(message: &str) -> &'static str {
    let lower = message.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        TIMEOUT
    } else if ["network", "socket", "connection"]
        .iter()
        .any(|n| lower.contains(n))
    {
        NETWORK_ERROR
    } else {
        GENERIC_FAILURE
    }
}
