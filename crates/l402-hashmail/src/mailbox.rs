use crate::error::HashmailError;
use crate::ratelimiter::RateLimiter;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;

pub type StreamId = [u8; 64];

/// Options recorded at `NewCipherBox` time (§4.7 / §9's configuration
/// knobs). `stale_timeout: None` disables reaping.
#[derive(Debug, Clone, Copy)]
pub struct MailboxConfig {
    pub msg_rate: Duration,
    pub burst: u32,
    pub stale_timeout: Option<Duration>,
}

const PIPE_CAPACITY: usize = 64 * 1024;

struct Occupancy {
    write_taken: bool,
    read_taken: bool,
    stale_timer: Option<JoinHandle<()>>,
}

/// A pair of pipes buffering between one writer and one reader (§4.7). At
/// most one holder of each half at a time; when both halves are free for
/// `stale_timeout`, `on_stale` fires so the registry can tear the mailbox
/// down.
pub struct Mailbox {
    pub id: StreamId,
    config: MailboxConfig,
    write_half: Mutex<Option<DuplexStream>>,
    read_half: Mutex<Option<DuplexStream>>,
    occupancy: Mutex<Occupancy>,
    pub rate_limiter: RateLimiter,
    on_stale: Arc<dyn Fn(StreamId) + Send + Sync>,
}

impl Mailbox {
    pub fn new(id: StreamId, config: MailboxConfig, on_stale: Arc<dyn Fn(StreamId) + Send + Sync>) -> Arc<Self> {
        let (write_half, read_half) = tokio::io::duplex(PIPE_CAPACITY);
        let this = Arc::new(Self {
            id,
            config,
            write_half: Mutex::new(Some(write_half)),
            read_half: Mutex::new(Some(read_half)),
            occupancy: Mutex::new(Occupancy {
                write_taken: false,
                read_taken: false,
                stale_timer: None,
            }),
            rate_limiter: RateLimiter::new(config.msg_rate, config.burst),
            on_stale,
        });
        // A mailbox that is created but never claimed by either side is
        // itself "both sub-streams unoccupied" from the start.
        this.arm_stale_timer_if_idle();
        this
    }

    fn arm_stale_timer_if_idle(self: &Arc<Self>) {
        let mut occupancy = self.occupancy.lock();
        if !occupancy.write_taken && !occupancy.read_taken {
            if let Some(stale_timeout) = self.config.stale_timeout {
                let id = self.id;
                let on_stale = self.on_stale.clone();
                occupancy.stale_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(stale_timeout).await;
                    on_stale(id);
                }));
            }
        }
    }

    /// Acquires the write half exclusively. Fails with `AlreadyInUse` if a
    /// writer already holds it.
    pub fn take_write(self: &Arc<Self>) -> Result<Occupant<DuplexStream>, HashmailError> {
        let half = {
            let mut occupancy = self.occupancy.lock();
            if occupancy.write_taken {
                return Err(HashmailError::AlreadyInUse);
            }
            occupancy.write_taken = true;
            self.cancel_stale_timer(&mut occupancy);
            self.write_half
                .lock()
                .take()
                .expect("write half present while untaken")
        };
        Ok(Occupant {
            value: Some(half),
            mailbox: self.clone(),
            side: Side::Write,
        })
    }

    /// Acquires the read half exclusively. Fails with `AlreadyInUse` if a
    /// reader already holds it.
    pub fn take_read(self: &Arc<Self>) -> Result<Occupant<DuplexStream>, HashmailError> {
        let half = {
            let mut occupancy = self.occupancy.lock();
            if occupancy.read_taken {
                return Err(HashmailError::AlreadyInUse);
            }
            occupancy.read_taken = true;
            self.cancel_stale_timer(&mut occupancy);
            self.read_half
                .lock()
                .take()
                .expect("read half present while untaken")
        };
        Ok(Occupant {
            value: Some(half),
            mailbox: self.clone(),
            side: Side::Read,
        })
    }

    fn cancel_stale_timer(&self, occupancy: &mut Occupancy) {
        if let Some(handle) = occupancy.stale_timer.take() {
            handle.abort();
        }
    }

    fn release(self: &Arc<Self>, side: Side, half: DuplexStream) {
        let mut occupancy = self.occupancy.lock();
        match side {
            Side::Write => {
                *self.write_half.lock() = Some(half);
                occupancy.write_taken = false;
            }
            Side::Read => {
                *self.read_half.lock() = Some(half);
                occupancy.read_taken = false;
            }
        }
        if !occupancy.write_taken && !occupancy.read_taken {
            if let Some(stale_timeout) = self.config.stale_timeout {
                let id = self.id;
                let on_stale = self.on_stale.clone();
                occupancy.stale_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(stale_timeout).await;
                    on_stale(id);
                }));
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Side {
    Write,
    Read,
}

/// RAII handle for a taken half: returns it to the mailbox (and re-arms the
/// stale timer if both halves are then free) when dropped.
pub struct Occupant<T> {
    value: Option<T>,
    mailbox: Arc<Mailbox>,
    side: Side,
}

impl std::ops::Deref for Occupant<DuplexStream> {
    type Target = DuplexStream;
    fn deref(&self) -> &DuplexStream {
        self.value.as_ref().expect("occupant value present until drop")
    }
}

impl std::ops::DerefMut for Occupant<DuplexStream> {
    fn deref_mut(&mut self) -> &mut DuplexStream {
        self.value.as_mut().expect("occupant value present until drop")
    }
}

impl Drop for Occupant<DuplexStream> {
    fn drop(&mut self) {
        if let Some(half) = self.value.take() {
            self.mailbox.release(self.side, half);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> StreamId {
        [byte; 64]
    }

    fn config(stale_timeout: Option<Duration>) -> MailboxConfig {
        MailboxConfig {
            msg_rate: Duration::from_millis(1),
            burst: 100,
            stale_timeout,
        }
    }

    #[tokio::test]
    async fn second_writer_is_rejected_while_first_holds_the_half() {
        let mailbox = Mailbox::new(id(1), config(None), Arc::new(|_| {}));
        let _writer = mailbox.take_write().unwrap();
        assert_eq!(mailbox.take_write().unwrap_err(), HashmailError::AlreadyInUse);
    }

    #[tokio::test]
    async fn writer_half_is_free_again_after_occupant_drops() {
        let mailbox = Mailbox::new(id(2), config(None), Arc::new(|_| {}));
        {
            let _writer = mailbox.take_write().unwrap();
        }
        mailbox.take_write().unwrap();
    }

    #[tokio::test]
    async fn stale_timer_fires_once_both_halves_are_free() {
        let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let fired_clone = fired.clone();
        let mailbox = Mailbox::new(
            id(3),
            config(Some(Duration::from_millis(30))),
            Arc::new(move |_| {
                fired_clone.store(true, std::sync::atomic::Ordering::SeqCst);
            }),
        );

        let writer = mailbox.take_write().unwrap();
        let reader = mailbox.take_read().unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!fired.load(std::sync::atomic::Ordering::SeqCst));

        drop(writer);
        drop(reader);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(fired.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn retaking_a_half_cancels_the_pending_stale_timer() {
        let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let fired_clone = fired.clone();
        let mailbox = Mailbox::new(
            id(4),
            config(Some(Duration::from_millis(30))),
            Arc::new(move |_| {
                fired_clone.store(true, std::sync::atomic::Ordering::SeqCst);
            }),
        );

        let writer = mailbox.take_write().unwrap();
        drop(writer);
        mailbox.take_write().unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!fired.load(std::sync::atomic::Ordering::SeqCst));
    }
}
