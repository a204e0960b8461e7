//! Message handlers and the middleware chain wrapped around them.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::Message;

/// Boxed error returned by handlers, so any crate's error can cross the transport.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result of handling one message.
pub type HandlerResult = std::result::Result<(), BoxError>;

/// Processes delivered messages.
///
/// Returning `Ok` marks the message's offset as processed. Returning `Err`
/// logs the failure and moves on to the next message without marking.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, msg: &Message) -> HandlerResult;
}

/// Wraps a handler with extra behavior (logging, tracing, filtering).
pub trait Middleware: Send + Sync {
    fn wrap(&self, next: Arc<dyn MessageHandler>) -> Arc<dyn MessageHandler>;
}

/// Applies middlewares around a terminal handler.
///
/// The first middleware in the slice becomes the outermost layer, so it sees
/// every message before the others do.
pub fn chain(
    handler: Arc<dyn MessageHandler>,
    middlewares: &[Arc<dyn Middleware>],
) -> Arc<dyn MessageHandler> {
    middlewares
        .iter()
        .rev()
        .fold(handler, |next, middleware| middleware.wrap(next))
}

/// Handler backed by an async closure.
pub struct HandlerFn<F>(F);

#[async_trait]
impl<F, Fut> MessageHandler for HandlerFn<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, msg: &Message) -> HandlerResult {
        (self.0)(msg.clone()).await
    }
}

/// Builds a handler from an async closure taking an owned message.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(HandlerFn(f))
}

/// Logs every received message before passing it on.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware;

struct Logged {
    next: Arc<dyn MessageHandler>,
}

#[async_trait]
impl MessageHandler for Logged {
    async fn handle(&self, msg: &Message) -> HandlerResult {
        tracing::info!(
            topic = %msg.topic,
            partition = msg.partition,
            offset = msg.offset,
            "message received"
        );
        self.next.handle(msg).await
    }
}

impl Middleware for LoggingMiddleware {
    fn wrap(&self, next: Arc<dyn MessageHandler>) -> Arc<dyn MessageHandler> {
        Arc::new(Logged { next })
    }
}

/// Runs one message through the handler chain and reports whether its offset
/// may be marked.
pub(crate) async fn dispatch(handler: &dyn MessageHandler, msg: &Message) -> bool {
    match handler.handle(msg).await {
        Ok(()) => {
            metrics::counter!("transport_messages_handled_total").increment(1);
            true
        }
        Err(e) => {
            metrics::counter!("transport_handler_failures_total").increment(1);
            tracing::error!(
                error = %e,
                topic = %msg.topic,
                partition = msg.partition,
                offset = msg.offset,
                "message handler failed, offset left unmarked"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Tag {
        name: &'static str,
        trail: Arc<Mutex<Vec<&'static str>>>,
    }

    struct Tagged {
        name: &'static str,
        trail: Arc<Mutex<Vec<&'static str>>>,
        next: Arc<dyn MessageHandler>,
    }

    #[async_trait]
    impl MessageHandler for Tagged {
        async fn handle(&self, msg: &Message) -> HandlerResult {
            self.trail.lock().unwrap().push(self.name);
            self.next.handle(msg).await
        }
    }

    impl Middleware for Tag {
        fn wrap(&self, next: Arc<dyn MessageHandler>) -> Arc<dyn MessageHandler> {
            Arc::new(Tagged {
                name: self.name,
                trail: self.trail.clone(),
                next,
            })
        }
    }

    #[tokio::test]
    async fn test_chain_runs_middlewares_in_declaration_order() {
        let trail = Arc::new(Mutex::new(Vec::new()));
        let terminal_trail = trail.clone();
        let terminal = handler_fn(move |_msg| {
            let trail = terminal_trail.clone();
            async move {
                trail.lock().unwrap().push("handler");
                Ok(())
            }
        });

        let middlewares: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(Tag {
                name: "first",
                trail: trail.clone(),
            }),
            Arc::new(Tag {
                name: "second",
                trail: trail.clone(),
            }),
        ];

        let handler = chain(terminal, &middlewares);
        handler.handle(&Message::builder().build()).await.unwrap();

        assert_eq!(*trail.lock().unwrap(), vec!["first", "second", "handler"]);
    }

    #[tokio::test]
    async fn test_dispatch_reports_handler_outcome() {
        let ok = handler_fn(|_msg| async { Ok(()) });
        let failing = handler_fn(|_msg| async { Err("boom".into()) });
        let msg = Message::builder().topic("t").build();

        assert!(dispatch(ok.as_ref(), &msg).await);
        assert!(!dispatch(failing.as_ref(), &msg).await);
    }

    #[tokio::test]
    async fn test_logging_middleware_passes_errors_through() {
        let failing = handler_fn(|_msg| async { Err("nope".into()) });
        let handler = chain(failing, &[Arc::new(LoggingMiddleware) as Arc<dyn Middleware>]);

        let err = handler
            .handle(&Message::builder().build())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "nope");
    }
}
