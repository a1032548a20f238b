//! AtelierDevice -- the handle presentation layers drive.
//!
//! Every method forwards an intent or a query to the IO task and returns
//! as soon as the task has accepted it. Writes happen later, one at a time,
//! paced by the settle delay. Observe their effect through
//! [`state`](AtelierDevice::state) or the event stream.

use tokio::sync::broadcast;

use atelier_core::error::{Error, Result};
use atelier_core::events::{Field, StateEvent};
use atelier_core::types::{DeviceInfo, DeviceState, InputSource, MAX_VOLUME};

use crate::commands::Command;
use crate::io::{DeviceIo, Request};
use crate::scheduler::Applied;
use crate::state::StateUpdate;

/// A connected Atelier appliance.
///
/// Constructed via [`AtelierBuilder`](crate::builder::AtelierBuilder).
pub struct AtelierDevice {
    io: DeviceIo,
    event_tx: broadcast::Sender<StateEvent>,
    info: DeviceInfo,
}

impl AtelierDevice {
    pub(crate) fn new(io: DeviceIo, event_tx: broadcast::Sender<StateEvent>, info: DeviceInfo) -> Self {
        AtelierDevice { io, event_tx, info }
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Snapshot of the believed state.
    ///
    /// If the state is older than the staleness threshold a status request
    /// is queued; the snapshot returned is the current, possibly stale, one.
    pub async fn state(&self) -> Result<DeviceState> {
        self.io.query(|reply| Request::GetState { reply }).await
    }

    /// Switch the appliance on or off.
    ///
    /// Power is a toggle on the wire, so the believed state is refreshed
    /// first when stale and the toggle is only sent if it still differs
    /// from `on` once the refresh has resolved.
    pub async fn set_power(&self, on: bool) -> Result<()> {
        self.io.send(Request::SetPower { on }).await
    }

    pub async fn set_mute(&self, on: bool) -> Result<()> {
        self.assign(StateUpdate::Mute(on)).await
    }

    pub async fn set_loudness(&self, on: bool) -> Result<()> {
        self.assign(StateUpdate::Loudness(on)).await
    }

    pub async fn set_speaker_1(&self, on: bool) -> Result<()> {
        self.assign(StateUpdate::Speaker1(on)).await
    }

    pub async fn set_speaker_2(&self, on: bool) -> Result<()> {
        self.assign(StateUpdate::Speaker2(on)).await
    }

    pub async fn set_input(&self, input: InputSource) -> Result<()> {
        self.assign(StateUpdate::Input(input)).await
    }

    async fn assign(&self, update: StateUpdate) -> Result<()> {
        self.io.send(Request::Assign { update }).await
    }

    /// Ramp the volume to `target` device units.
    ///
    /// The believed volume is set to `target` immediately. A ramp already
    /// in progress is retargeted rather than restarted.
    pub async fn set_volume(&self, target: u8) -> Result<()> {
        if target > MAX_VOLUME {
            return Err(Error::InvalidParameter(format!(
                "volume {target} out of range 0..={MAX_VOLUME}"
            )));
        }
        self.io.send(Request::SetVolume { target }).await
    }

    /// Step the volume up by one unit.
    ///
    /// The believed volume only follows if the front panel was already
    /// showing the volume readout.
    pub async fn volume_up(&self) -> Result<()> {
        self.write(Command::VolumeUp, Some(Applied::GatedStep)).await
    }

    /// Step the volume down by one unit. See [`volume_up`](Self::volume_up).
    pub async fn volume_down(&self) -> Result<()> {
        self.write(Command::VolumeDown, Some(Applied::GatedStep)).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.write(Command::Stop, None).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.write(Command::Pause, None).await
    }

    pub async fn start(&self) -> Result<()> {
        self.write(Command::Start, None).await
    }

    pub async fn fast_forward(&self) -> Result<()> {
        self.write(Command::FastForward, None).await
    }

    pub async fn rewind(&self) -> Result<()> {
        self.write(Command::Rewind, None).await
    }

    /// Queue a raw catalog command. Its catalog effect is applied once the
    /// write succeeds.
    pub async fn enqueue(&self, command: Command) -> Result<()> {
        self.write(command, Some(Applied::Catalog)).await
    }

    async fn write(&self, command: Command, applied: Option<Applied>) -> Result<()> {
        self.io.send(Request::Enqueue { command, applied }).await
    }

    /// Whether `command` is still waiting in the queue.
    pub async fn is_enqueued(&self, command: Command) -> Result<bool> {
        self.io
            .query(|reply| Request::IsEnqueued { command, reply })
            .await
    }

    /// Whether the last two writes were volume commands close enough
    /// together that the front panel is known to be tracking them.
    pub async fn was_recently_confirmed(&self) -> Result<bool> {
        self.io
            .query(|reply| Request::RecentlyConfirmed { reply })
            .await
    }

    /// Target of the volume ramp in progress, if any.
    pub async fn ramp_target(&self) -> Result<Option<u8>> {
        self.io.query(|reply| Request::RampTarget { reply }).await
    }

    /// Subscribe to every state event.
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.event_tx.subscribe()
    }

    /// Subscribe to the events of one field.
    pub fn subscribe_field(&self, field: Field) -> FieldReceiver {
        FieldReceiver {
            field,
            rx: self.event_tx.subscribe(),
        }
    }

    /// Close the port and stop the IO task.
    ///
    /// A failure to close the port is logged, not returned. Commands still
    /// queued are discarded.
    pub async fn shutdown(self) -> Result<()> {
        self.io.shutdown().await
    }
}

/// Event receiver filtered to a single [`Field`].
pub struct FieldReceiver {
    field: Field,
    rx: broadcast::Receiver<StateEvent>,
}

impl FieldReceiver {
    pub fn field(&self) -> Field {
        self.field
    }

    /// Wait for the next event of this field.
    ///
    /// Events lost to lag are skipped. Returns `None` once the device is
    /// gone.
    pub async fn recv(&mut self) -> Option<StateEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.field() == self.field => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, field = ?self.field, "field receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take an already-published event of this field without waiting.
    pub fn try_recv(&mut self) -> Option<StateEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if event.field() == self.field => return Some(event),
                Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use atelier_test_harness::{MockHandle, MockTransport};
    use tokio::time::{sleep, Instant};

    use crate::builder::AtelierBuilder;

    const VOLUME_UP: &[u8] = b"0<3";
    const VOLUME_DOWN: &[u8] = b"0<4";
    const XMIT_STAT: &[u8] = b"0:7";

    async fn make_device() -> (AtelierDevice, MockHandle) {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let device = AtelierBuilder::new()
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();
        (device, handle)
    }

    /// A device whose state was confirmed by a status frame, so no liveness
    /// poll interferes with the test.
    async fn make_fresh_device() -> (AtelierDevice, MockHandle) {
        let (device, handle) = make_device().await;
        handle.inject_line(";0;");
        settle().await;
        (device, handle)
    }

    async fn settle() {
        sleep(Duration::from_millis(10)).await;
    }

    // -----------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn commands_written_in_order_and_spaced() {
        let (device, handle) = make_fresh_device().await;

        device.stop().await.unwrap();
        device.pause().await.unwrap();
        device.start().await.unwrap();
        device.rewind().await.unwrap();
        sleep(Duration::from_secs(3)).await;

        let writes = handle.writes();
        let data: Vec<_> = writes.iter().map(|w| w.data.clone()).collect();
        assert_eq!(
            data,
            vec![b"0:4".to_vec(), b"0:5".to_vec(), b"0:6".to_vec(), b"0:3".to_vec()]
        );
        for pair in writes.windows(2) {
            assert!(pair[1].at - pair[0].at >= Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn status_request_settles_three_seconds() {
        let (device, handle) = make_fresh_device().await;

        device.enqueue(Command::TransmitStatus).await.unwrap();
        device.stop().await.unwrap();
        sleep(Duration::from_secs(5)).await;

        let writes = handle.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].data, XMIT_STAT);
        assert!(writes[1].at - writes[0].at >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn is_enqueued_until_dispatched() {
        let (device, _handle) = make_fresh_device().await;

        device.stop().await.unwrap();
        device.pause().await.unwrap();
        // Stop goes out at once; pause waits out the settle delay.
        settle().await;
        assert!(!device.is_enqueued(Command::Stop).await.unwrap());
        assert!(device.is_enqueued(Command::Pause).await.unwrap());

        sleep(Duration::from_secs(1)).await;
        assert!(!device.is_enqueued(Command::Pause).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_still_advances_queue() {
        let (device, handle) = make_fresh_device().await;
        handle.fail_next_writes(1);

        device.enqueue(Command::Mute).await.unwrap();
        device.stop().await.unwrap();
        sleep(Duration::from_secs(2)).await;

        // The failed mute is not recorded; stop went out after it.
        assert_eq!(handle.sent_data(), vec![b"0:4".to_vec()]);
        let state = device.state().await.unwrap();
        assert!(!state.is_mute);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnected_port_still_advances_queue() {
        let (device, handle) = make_fresh_device().await;

        handle.set_connected(false);
        device.stop().await.unwrap();
        device.pause().await.unwrap();
        sleep(Duration::from_secs(2)).await;
        assert!(!device.is_enqueued(Command::Pause).await.unwrap());

        handle.set_connected(true);
        device.start().await.unwrap();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.sent_data(), vec![b"0:6".to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn catalog_effect_applied_on_write() {
        let (device, _handle) = make_fresh_device().await;

        device.enqueue(Command::Mute).await.unwrap();
        device.enqueue(Command::InputCd).await.unwrap();
        sleep(Duration::from_secs(2)).await;

        let state = device.state().await.unwrap();
        assert!(state.is_mute);
        assert_eq!(state.input_source, InputSource::CD);
    }

    // -----------------------------------------------------------------
    // Status frames
    // -----------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn volume_frame_updates_state_once() {
        let (device, handle) = make_fresh_device().await;
        let mut rx = device.subscribe();

        handle.inject_line(";1;55");
        settle().await;

        assert_eq!(rx.try_recv().unwrap(), StateEvent::VolumeChanged { volume: 55 });
        assert!(rx.try_recv().is_err());
        assert_eq!(device.state().await.unwrap().volume, 55);
    }

    #[tokio::test(start_paused = true)]
    async fn mute_frames() {
        let (device, handle) = make_fresh_device().await;

        handle.inject_line(";6; Y");
        settle().await;
        assert!(device.state().await.unwrap().is_mute);

        handle.inject_line(";6; N");
        settle().await;
        assert!(!device.state().await.unwrap().is_mute);
    }

    #[tokio::test(start_paused = true)]
    async fn garbage_leaves_state_untouched() {
        let (device, handle) = make_fresh_device().await;
        let before = device.state().await.unwrap();
        let mut rx = device.subscribe();

        sleep(Duration::from_secs(1)).await;
        handle.inject_line("garbage");
        handle.inject_line(";1;250");
        handle.inject_line(";7;XX");
        settle().await;

        assert_eq!(device.state().await.unwrap(), before);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn field_receiver_filters() {
        let (device, handle) = make_fresh_device().await;
        let mut mute_rx = device.subscribe_field(Field::Mute);
        assert_eq!(mute_rx.field(), Field::Mute);

        handle.inject_line(";1;20");
        handle.inject_line(";6;Y");
        settle().await;

        assert_eq!(mute_rx.recv().await, Some(StateEvent::MuteChanged { on: true }));
        assert_eq!(mute_rx.try_recv(), None);
    }

    // -----------------------------------------------------------------
    // Conditional toggles
    // -----------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn toggle_skipped_when_unchanged() {
        let (device, handle) = make_fresh_device().await;

        device.set_mute(false).await.unwrap();
        device.set_loudness(false).await.unwrap();
        device.set_input(InputSource::TV).await.unwrap();
        device.set_speaker_1(false).await.unwrap();
        sleep(Duration::from_secs(2)).await;

        assert!(handle.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_written_when_different() {
        let (device, handle) = make_fresh_device().await;

        device.set_mute(true).await.unwrap();
        device.set_speaker_2(true).await.unwrap();
        device.set_input(InputSource::Tape1).await.unwrap();
        sleep(Duration::from_secs(3)).await;

        assert_eq!(
            handle.sent_data(),
            vec![b"0<5".to_vec(), b"0<@".to_vec(), b"09?".to_vec()]
        );
        let state = device.state().await.unwrap();
        assert!(state.is_mute);
        assert!(state.is_speaker2);
        assert_eq!(state.input_source, InputSource::Tape1);
    }

    // -----------------------------------------------------------------
    // Volume steps
    // -----------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn first_volume_step_only_wakes_display() {
        let (device, handle) = make_fresh_device().await;

        device.volume_up().await.unwrap();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(handle.count_of(VOLUME_UP), 1);
        assert_eq!(device.state().await.unwrap().volume, 40);
        assert!(!device.was_recently_confirmed().await.unwrap());

        device.volume_up().await.unwrap();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(device.state().await.unwrap().volume, 41);
        assert!(device.was_recently_confirmed().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn volume_step_after_pause_wakes_display_again() {
        let (device, _handle) = make_fresh_device().await;

        device.volume_down().await.unwrap();
        device.volume_down().await.unwrap();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(device.state().await.unwrap().volume, 39);

        sleep(Duration::from_secs(5)).await;
        device.volume_down().await.unwrap();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(device.state().await.unwrap().volume, 39);
    }

    // -----------------------------------------------------------------
    // Volume ramp
    // -----------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn ramp_up_to_target() {
        let (device, handle) = make_fresh_device().await;

        device.set_volume(70).await.unwrap();
        assert_eq!(device.state().await.unwrap().volume, 70);
        assert_eq!(device.ramp_target().await.unwrap(), Some(70));

        sleep(Duration::from_secs(20)).await;

        // One priming step plus thirty counted steps.
        assert_eq!(handle.count_of(VOLUME_UP), 31);
        assert_eq!(handle.count_of(VOLUME_DOWN), 0);
        assert_eq!(device.state().await.unwrap().volume, 70);
        assert_eq!(device.ramp_target().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn ramp_down_to_target() {
        let (device, handle) = make_fresh_device().await;

        device.set_volume(35).await.unwrap();
        sleep(Duration::from_secs(5)).await;

        assert_eq!(handle.count_of(VOLUME_UP), 1);
        assert_eq!(handle.count_of(VOLUME_DOWN), 5);
        assert_eq!(device.ramp_target().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn ramp_retarget_in_flight() {
        let (device, handle) = make_fresh_device().await;

        device.set_volume(50).await.unwrap();
        // Priming step plus three counted steps.
        sleep(Duration::from_millis(1600)).await;
        device.set_volume(45).await.unwrap();
        sleep(Duration::from_secs(10)).await;

        // 40 -> 45 needs five ups in total; the retarget adds no second
        // priming step.
        assert_eq!(handle.count_of(VOLUME_UP), 1 + 5);
        assert_eq!(handle.count_of(VOLUME_DOWN), 0);
        assert_eq!(device.state().await.unwrap().volume, 45);
        assert_eq!(device.ramp_target().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn ramp_retarget_reverses_direction() {
        let (device, handle) = make_fresh_device().await;

        device.set_volume(60).await.unwrap();
        sleep(Duration::from_millis(1600)).await;
        device.set_volume(40).await.unwrap();
        sleep(Duration::from_secs(10)).await;

        let ups = handle.count_of(VOLUME_UP);
        let downs = handle.count_of(VOLUME_DOWN);
        assert_eq!(ups - 1, downs);
        assert_eq!(device.ramp_target().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn set_volume_to_current_is_noop() {
        let (device, handle) = make_fresh_device().await;

        device.set_volume(40).await.unwrap();
        sleep(Duration::from_secs(2)).await;
        assert!(handle.writes().is_empty());
        assert_eq!(device.ramp_target().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn set_volume_out_of_range() {
        let (device, _handle) = make_fresh_device().await;
        let err = device.set_volume(101).await.unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn set_volume_to_echoed_value_retargets_ramp() {
        let (device, handle) = make_fresh_device().await;

        device.set_volume(70).await.unwrap();
        // Priming step plus three counted steps.
        sleep(Duration::from_millis(1600)).await;
        handle.inject_line(";1;43");
        settle().await;
        assert_eq!(device.state().await.unwrap().volume, 43);

        device.set_volume(43).await.unwrap();
        sleep(Duration::from_secs(10)).await;

        assert_eq!(handle.count_of(VOLUME_UP), 1 + 3);
        assert_eq!(device.ramp_target().await.unwrap(), None);
        assert_eq!(device.state().await.unwrap().volume, 43);
    }

    #[tokio::test(start_paused = true)]
    async fn ramp_goes_ahead_of_later_commands() {
        let (device, handle) = make_fresh_device().await;

        device.set_volume(42).await.unwrap();
        device.stop().await.unwrap();
        sleep(Duration::from_secs(5)).await;

        let data = handle.sent_data();
        assert_eq!(data.last().map(Vec::as_slice), Some(&b"0:4"[..]));
        assert_eq!(data.len(), 1 + 2 + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unresponsive_ramp_is_abandoned() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let device = AtelierBuilder::new()
            .max_ramp_steps(4)
            // Steps land farther apart than the refresh window, so none of
            // them is ever confirmed.
            .settle_delay(Duration::from_secs(4))
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();
        handle.inject_line(";0;");
        settle().await;

        device.set_volume(60).await.unwrap();
        sleep(Duration::from_secs(40)).await;

        assert_eq!(handle.count_of(VOLUME_UP), 1 + 4);
        assert_eq!(device.ramp_target().await.unwrap(), None);
    }

    // -----------------------------------------------------------------
    // Liveness
    // -----------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn stale_state_polls_once() {
        let (device, handle) = make_device().await;

        device.state().await.unwrap();
        device.state().await.unwrap();
        sleep(Duration::from_millis(100)).await;
        device.state().await.unwrap();
        sleep(Duration::from_millis(100)).await;

        assert_eq!(handle.count_of(XMIT_STAT), 1);
        assert!(!device.is_enqueued(Command::TransmitStatus).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_poll_waits_behind_queued_commands() {
        let (device, handle) = make_device().await;

        device.stop().await.unwrap();
        device.pause().await.unwrap();
        device.state().await.unwrap();
        assert!(device.is_enqueued(Command::TransmitStatus).await.unwrap());

        sleep(Duration::from_secs(2)).await;
        assert_eq!(handle.sent_data().last().map(Vec::as_slice), Some(XMIT_STAT));
        assert!(!device.is_enqueued(Command::TransmitStatus).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_poll_forces_off() {
        let (device, handle) = make_device().await;
        handle.inject_line(";0;");
        settle().await;
        assert!(device.state().await.unwrap().is_on);

        sleep(Duration::from_secs(61)).await;
        let mut rx = device.subscribe_field(Field::Power);
        device.state().await.unwrap();
        sleep(Duration::from_secs(3)).await;

        assert_eq!(handle.count_of(XMIT_STAT), 1);
        assert!(!device.state().await.unwrap().is_on);
        assert_eq!(rx.try_recv(), Some(StateEvent::PowerChanged { on: false }));
    }

    #[tokio::test(start_paused = true)]
    async fn local_write_does_not_hide_unanswered_poll() {
        let (device, handle) = make_fresh_device().await;
        assert!(device.state().await.unwrap().is_on);

        sleep(Duration::from_secs(61)).await;
        device.set_mute(true).await.unwrap();
        device.state().await.unwrap();
        sleep(Duration::from_secs(6)).await;

        assert_eq!(handle.sent_data(), vec![b"0<5".to_vec(), XMIT_STAT.to_vec()]);
        assert!(!device.state().await.unwrap().is_on);
    }

    #[tokio::test(start_paused = true)]
    async fn optimistic_volume_does_not_hide_unanswered_poll() {
        let (device, handle) = make_fresh_device().await;

        sleep(Duration::from_secs(61)).await;
        device.state().await.unwrap();
        device.set_volume(45).await.unwrap();
        sleep(Duration::from_secs(6)).await;

        assert_eq!(handle.count_of(XMIT_STAT), 1);
        let state = device.state().await.unwrap();
        assert!(!state.is_on);
        assert_eq!(state.volume, 45);
    }

    #[tokio::test(start_paused = true)]
    async fn answered_poll_keeps_state() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        handle.reply_to(XMIT_STAT, b";0;\r\n;1;33\r\n");
        let device = AtelierBuilder::new()
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();

        device.state().await.unwrap();
        sleep(Duration::from_secs(3)).await;

        let state = device.state().await.unwrap();
        assert!(state.is_on);
        assert_eq!(state.volume, 33);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_poll_write_still_times_out() {
        let (device, handle) = make_device().await;
        handle.fail_next_writes(1);

        let start = Instant::now();
        device.state().await.unwrap();
        sleep(Duration::from_secs(3)).await;

        let state = device.state().await.unwrap();
        assert!(!state.is_on);
        assert!(state.last_updated.is_some_and(|at| at > start));
    }

    // -----------------------------------------------------------------
    // Power
    // -----------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn set_power_waits_for_poll_timeout() {
        let (device, handle) = make_device().await;

        device.set_power(true).await.unwrap();
        sleep(Duration::from_millis(100)).await;
        // Only the poll so far.
        assert_eq!(handle.sent_data(), vec![XMIT_STAT.to_vec()]);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(handle.sent_data(), vec![XMIT_STAT.to_vec(), b"0<2".to_vec()]);
        assert!(device.state().await.unwrap().is_on);
    }

    #[tokio::test(start_paused = true)]
    async fn set_power_skipped_when_poll_says_on() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        handle.reply_to(XMIT_STAT, b";0;\r\n");
        let device = AtelierBuilder::new()
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();

        device.set_power(true).await.unwrap();
        sleep(Duration::from_secs(5)).await;

        assert_eq!(handle.sent_data(), vec![XMIT_STAT.to_vec()]);
        assert!(device.state().await.unwrap().is_on);
    }

    #[tokio::test(start_paused = true)]
    async fn set_power_off_when_fresh() {
        let (device, handle) = make_fresh_device().await;

        device.set_power(false).await.unwrap();
        sleep(Duration::from_secs(1)).await;

        assert_eq!(handle.sent_data(), vec![b"0<2".to_vec()]);
        assert!(!device.state().await.unwrap().is_on);
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_port() {
        let (device, handle) = make_fresh_device().await;
        device.shutdown().await.unwrap();
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn info_reports_builder_values() {
        let mock = MockTransport::new();
        let device = AtelierBuilder::new()
            .name("Living Room")
            .model("Atelier R4")
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();
        assert_eq!(device.info().name, "Living Room");
        assert_eq!(device.info().model, "Atelier R4");
        assert_eq!(device.info().port, None);
    }
}
