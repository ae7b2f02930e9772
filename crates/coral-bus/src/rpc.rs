//! Request handling seam

use coral_core::{CoralError, CoralResult, Reply, Request, Role};

/// Endpoint-side request handler
///
/// Implemented by every role service. Handlers run on the caller's stack
/// in the in-process bus; a stuck handler blocks that one request only.
pub trait RequestHandler: Send + Sync {
    fn handle(&self, request: Request) -> CoralResult<Reply>;
}

/// Reject a request the role does not serve
pub fn unsupported(role: Role, request: &Request) -> CoralError {
    CoralError::Protocol(format!("{role} does not serve {request:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl RequestHandler for Echo {
        fn handle(&self, request: Request) -> CoralResult<Reply> {
            match request {
                Request::Ping => Ok(Reply::Pong),
                other => Err(unsupported(Role::Registry, &other)),
            }
        }
    }

    #[test]
    fn test_unsupported_request_is_a_protocol_error() {
        let err = Echo.handle(Request::Describe).unwrap_err();
        assert!(matches!(err, CoralError::Protocol(_)));
    }
}
