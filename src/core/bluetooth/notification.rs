//! Notification handling
//! Each subscription runs in its own task that forwards payloads into the
//! reassembler queue until it is cancelled or the stream ends.

use std::fmt;

use bluest::Characteristic;
use futures_util::{Stream, StreamExt};
use log::{debug, error, info};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::error::SubscribeError;
use crate::core::reassembler::NotificationSender;

pub struct NotificationHandler;

impl NotificationHandler {
    /// Starts forwarding notifications from `notify_char`. Returns once the
    /// platform has accepted (or refused) the registration.
    pub async fn setup_notifications(
        notify_char: Characteristic,
        notifications: NotificationSender,
        cancel: CancellationToken,
    ) -> Result<(), SubscribeError> {
        info!("Subscribing to notifications on {}...", notify_char.uuid());
        let (ready_tx, ready_rx) = oneshot::channel();

        tokio::spawn(async move {
            Self::process_notifications(notify_char, notifications, cancel, ready_tx).await;
        });

        match ready_rx.await {
            Ok(result) => result,
            Err(_) => Err(SubscribeError::Registration(
                "notification task ended before registering".to_string(),
            )),
        }
    }

    async fn process_notifications(
        notify_char: Characteristic,
        notifications: NotificationSender,
        cancel: CancellationToken,
        ready: oneshot::Sender<Result<(), SubscribeError>>,
    ) {
        let sender_id = notify_char.uuid().to_string();

        let mut notification_stream = match notify_char.notify().await {
            Ok(stream) => {
                let _ = ready.send(Ok(()));
                stream
            }
            Err(e) => {
                error!("Failed to subscribe to notifications: {}", e);
                let _ = ready.send(Err(SubscribeError::Registration(e.to_string())));
                return;
            }
        };

        info!("Listening for notifications from {}...", sender_id);
        Self::forward(&mut notification_stream, &sender_id, &notifications, &cancel).await;
        info!("Notification stream ended");
    }

    /// Pushes each payload until `cancel` fires or the stream ends. Once
    /// cancelled nothing more is pushed, not even a value already received,
    /// so teardown's reset is never followed by bytes from the old link.
    async fn forward<S, E>(
        stream: &mut S,
        sender_id: &str,
        notifications: &NotificationSender,
        cancel: &CancellationToken,
    ) where
        S: Stream<Item = Result<Vec<u8>, E>> + Unpin,
        E: fmt::Display,
    {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Notification subscription for {} cancelled", sender_id);
                    break;
                }
                result = stream.next() => {
                    match result {
                        Some(Ok(value)) => {
                            if cancel.is_cancelled() {
                                debug!("Dropping {} bytes received after cancel", value.len());
                                break;
                            }
                            debug!("Received {} bytes: {:?}", value.len(), value);
                            notifications.push(sender_id, value);
                        }
                        Some(Err(e)) => {
                            error!("Error in notification stream: {}", e);
                            break;
                        }
                        None => break,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reassembler::{RxEvent, rx_channel};
    use futures_util::stream;

    fn chunks(parts: &[&[u8]]) -> Vec<Result<Vec<u8>, String>> {
        parts.iter().map(|p| Ok(p.to_vec())).collect()
    }

    #[tokio::test]
    async fn test_forwards_until_stream_ends() {
        let (notifications, mut events) = rx_channel();
        let mut notify_stream = stream::iter(chunks(&[b"ab", b"c\n"]));

        NotificationHandler::forward(&mut notify_stream, "rx", &notifications, &CancellationToken::new()).await;

        assert_eq!(
            events.try_recv().unwrap(),
            RxEvent::Chunk { sender: "rx".into(), bytes: b"ab".to_vec() }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            RxEvent::Chunk { sender: "rx".into(), bytes: b"c\n".to_vec() }
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancelled_before_data() {
        let (notifications, mut events) = rx_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut notify_stream = stream::iter(chunks(&[b"stale\n"]));

        NotificationHandler::forward(&mut notify_stream, "rx", &notifications, &cancel).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_value_received_with_cancel_is_dropped() {
        let (notifications, mut events) = rx_channel();
        let cancel = CancellationToken::new();
        let on_receive = cancel.clone();
        let mut notify_stream = stream::iter(chunks(&[b"late", b"later"])).inspect(move |_| on_receive.cancel());

        NotificationHandler::forward(&mut notify_stream, "rx", &notifications, &cancel).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stream_error_ends_forwarding() {
        let (notifications, mut events) = rx_channel();
        let items = vec![Err("link reset".to_string()), Ok(b"after\n".to_vec())];
        let mut notify_stream = stream::iter(items);

        NotificationHandler::forward(&mut notify_stream, "rx", &notifications, &CancellationToken::new()).await;
        assert!(events.try_recv().is_err());
    }
}
