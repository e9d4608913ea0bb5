#[cfg(test)]
mod client_test;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, Mutex};

use crate::codec::{marshal, unmarshal};
use crate::config::ClientConfig;
use crate::domain::{Flight, Food, ReserveFlight};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::session::Session;
use crate::stream::Stream;

const SUBSCRIPTION_CHANNEL_CAPACITY: usize = 32;

/// RPC facade composing [`Session`]/[`Stream`] into request/response calls
/// and the one long-running server-push subscription.
///
/// Holds the set of reservations made through this client, keyed by
/// reservation id, so `cancel`/`add_meal` can validate locally before
/// opening a stream and callers can list what they've booked.
pub struct Client {
    config: ClientConfig,
    session: Arc<Session>,
    reservations: Mutex<HashMap<String, ReserveFlight>>,
}

impl Client {
    /// Binds a session to `config`'s remote endpoint. The session's receive
    /// loop starts immediately.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let session = Session::connect(&config).await?;
        Ok(Client {
            config,
            session,
            reservations: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn find_flights(&self, source: &str, destination: &str) -> Result<Vec<Flight>> {
        if source.is_empty() {
            return Err(Error::InvalidArgument("source".to_owned()));
        }
        if destination.is_empty() {
            return Err(Error::InvalidArgument("destination".to_owned()));
        }
        let mut query = HashMap::new();
        query.insert("source".to_owned(), source.to_owned());
        query.insert("destination".to_owned(), destination.to_owned());
        let body = self.call("FindFlights", query).await?;
        unmarshal(&body)
    }

    pub async fn find_flight(&self, id: &str) -> Result<Flight> {
        if id.is_empty() {
            return Err(Error::InvalidArgument("id".to_owned()));
        }
        let mut query = HashMap::new();
        query.insert("id".to_owned(), id.to_owned());
        let body = self.call("FindFlight", query).await?;
        unmarshal(&body)
    }

    pub async fn reserve(&self, id: &str, seats: u32) -> Result<ReserveFlight> {
        if id.is_empty() {
            return Err(Error::InvalidArgument("id".to_owned()));
        }
        if seats == 0 {
            return Err(Error::InvalidArgument("seats".to_owned()));
        }
        let mut query = HashMap::new();
        query.insert("id".to_owned(), id.to_owned());
        query.insert("seats".to_owned(), seats.to_string());
        let body = self.call("ReserveFlight", query).await?;
        let reservation: ReserveFlight = unmarshal(&body)?;
        self.reservations
            .lock()
            .await
            .insert(reservation.id.clone(), reservation.clone());
        Ok(reservation)
    }

    pub async fn cancel(&self, id: &str) -> Result<ReserveFlight> {
        if id.is_empty() {
            return Err(Error::InvalidArgument("id".to_owned()));
        }
        if !self.reservations.lock().await.contains_key(id) {
            return Err(Error::InvalidArgument(id.to_owned()));
        }
        let mut query = HashMap::new();
        query.insert("id".to_owned(), id.to_owned());
        let body = self.call("CancelFlight", query).await?;
        let reservation: ReserveFlight = unmarshal(&body)?;
        self.reservations.lock().await.remove(&reservation.id);
        Ok(reservation)
    }

    pub async fn get_meals(&self) -> Result<Vec<Food>> {
        let body = self.call("GetMeals", HashMap::new()).await?;
        unmarshal(&body)
    }

    pub async fn add_meal(&self, reservation_id: &str, meal_id: &str) -> Result<ReserveFlight> {
        if reservation_id.is_empty() {
            return Err(Error::InvalidArgument("id".to_owned()));
        }
        if meal_id.is_empty() {
            return Err(Error::InvalidArgument("meal_id".to_owned()));
        }
        let mut query = HashMap::new();
        query.insert("id".to_owned(), reservation_id.to_owned());
        query.insert("meal_id".to_owned(), meal_id.to_owned());
        let body = self.call("AddMeals", query).await?;
        let reservation: ReserveFlight = unmarshal(&body)?;
        self.reservations
            .lock()
            .await
            .insert(reservation.id.clone(), reservation.clone());
        Ok(reservation)
    }

    /// Snapshot of every reservation made through this client so far.
    pub async fn reservations_idx(&self) -> Vec<ReserveFlight> {
        self.reservations.lock().await.values().cloned().collect()
    }

    /// Opens a stream without a deadline, sends one subscribe request whose
    /// query carries a future absolute timestamp, and starts a background
    /// task that decodes each server push and forwards it on a channel until
    /// the stream observes FIN.
    pub async fn monitor_updates(&self, duration: Duration) -> Result<Subscription> {
        let deadline_at = SystemTime::now() + duration;
        let millis = deadline_at
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::Other(e.to_string()))?
            .as_millis();

        let mut query = HashMap::new();
        query.insert("timestamp".to_owned(), millis.to_string());

        let stream = self.session.open(None).await?;
        let request = Message::request("MonitorUpdates", query);
        stream.write(&marshal(&request)).await?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CHANNEL_CAPACITY);
        let task_stream = Arc::clone(&stream);
        tokio::spawn(async move {
            loop {
                let raw = match task_stream.read().await {
                    Ok(raw) => raw,
                    Err(err) => {
                        log::debug!("subscription read loop exiting: {}", err);
                        break;
                    }
                };

                if !raw.is_empty() {
                    match unmarshal::<Message>(&raw) {
                        Ok(msg) if !msg.error.is_empty() => {
                            let err = Error::Server {
                                code: msg.error.code,
                                detail: msg.error.detail,
                            };
                            if tx.send(Err(err)).await.is_err() {
                                break;
                            }
                        }
                        Ok(msg) => match unmarshal::<Flight>(&msg.body) {
                            Ok(flight) => {
                                if tx.send(Ok(flight)).await.is_err() {
                                    break;
                                }
                            }
                            Err(err) => {
                                if tx.send(Err(err)).await.is_err() {
                                    break;
                                }
                            }
                        },
                        Err(err) => {
                            log::warn!("dropping malformed subscription push: {}", err);
                        }
                    }
                }

                if task_stream.is_closed() {
                    log::debug!("subscription stream closed, exiting read loop");
                    break;
                }
            }
        });

        Ok(Subscription { stream, receiver: rx })
    }

    /// Builds and marshals one request, then attempts up to `retries`
    /// times: open a stream, write the request, read one response. A
    /// failed attempt's stream is closed before the next attempt opens a
    /// fresh one reusing its sid.
    async fn call(&self, method: &str, query: HashMap<String, String>) -> Result<Vec<u8>> {
        let request = Message::request(method, query);
        let payload = marshal(&request);

        let mut prior: Option<Arc<Stream>> = None;
        for attempt in 0..self.config.retries {
            let stream = match &prior {
                Some(p) => self.session.open_with_existing(p, Some(self.config.deadline)).await?,
                None => self.session.open(Some(self.config.deadline)).await?,
            };

            match Self::send_and_receive(&stream, &payload).await {
                Ok(body) => {
                    let _ = stream.close().await;
                    return Ok(body);
                }
                Err(err) => {
                    log::debug!("{} attempt {} failed: {}", method, attempt, err);
                    let _ = stream.close().await;
                    prior = Some(stream);
                }
            }
        }

        Err(Error::TransportFailure {
            method: method.to_owned(),
        })
    }

    async fn send_and_receive(stream: &Arc<Stream>, payload: &[u8]) -> Result<Vec<u8>> {
        stream.write(payload).await?;
        let raw = stream.read().await?;
        let msg: Message = unmarshal(&raw)?;
        if !msg.error.is_empty() {
            return Err(Error::Server {
                code: msg.error.code,
                detail: msg.error.detail,
            });
        }
        Ok(msg.body)
    }
}

/// Handle to a running `MonitorUpdates` subscription. Each push arrives as
/// one decoded [`Flight`] (or an error if the server sent one) on
/// [`Subscription::recv`]; [`Subscription::cancel`] closes the underlying
/// stream, which unblocks the background reader within the runtime's next
/// poll.
pub struct Subscription {
    stream: Arc<Stream>,
    receiver: mpsc::Receiver<Result<Flight>>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Result<Flight>> {
        self.receiver.recv().await
    }

    pub async fn cancel(&self) -> Result<()> {
        self.stream.close().await
    }
}
