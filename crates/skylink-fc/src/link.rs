use std::collections::HashMap;
use std::time::{Duration, Instant};

use skylink_wire::dialect::{
    MavAutopilot, MavCmd, MavFrame, MavModeFlag, MavState, MavType, HEARTBEAT_DATA, MISSION_ITEM_DATA,
};
use skylink_wire::{decode, FrameHeader, Message, MessageKind, SetMode};
use tracing::{debug, info, trace, warn};

use crate::error::{FcError, Result};
use crate::events::{EventSink, LinkEvent};
use crate::exchange::{ReliableExchange, RetryOutcome, RetryPolicy};
use crate::liveness::{LivenessMonitor, Presence, DEFAULT_LIVENESS_TIMEOUT};
use crate::mode::mode_code;
use crate::outbound::{FrameSink, Outbound};
use crate::params::{CompletionPolicy, ParamState, ParameterDownload};
use crate::timer::RetryTimer;
use crate::tracker::{Location, StateTracker, VehicleState, DEFAULT_POSITION_WINDOW};
use crate::waypoints::WaypointDownload;

/// `current` value that turns a mission item into a guided-mode target.
const GUIDED_CURRENT: u8 = 2;

#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub sys_id: u8,
    pub comp_id: u8,
    pub target_sys: u8,
    pub target_comp: u8,
    pub retry: RetryPolicy,
    pub position_window: Duration,
    pub liveness_timeout: Duration,
    pub param_completion: CompletionPolicy,
    pub require_heartbeat: bool,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            sys_id: 255,
            comp_id: 190,
            target_sys: 1,
            target_comp: 1,
            retry: RetryPolicy::default(),
            position_window: DEFAULT_POSITION_WINDOW,
            liveness_timeout: DEFAULT_LIVENESS_TIMEOUT,
            param_completion: CompletionPolicy::default(),
            require_heartbeat: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub frames: u64,
    pub malformed: u64,
    /// Frames from systems other than the target.
    pub foreign: u64,
    /// Frames missing according to the inbound sequence numbers.
    pub lost: u64,
    /// Frames that stepped backwards in sequence: duplicates or reordering.
    pub out_of_order: u64,
    pub sequence_violations: u64,
}

/// Everything known about one vehicle, owned by a single context.
///
/// Inbound frames, retry expiries, ticks and commands all come in through
/// `&mut self`; callers on other threads must funnel them through one loop
/// (see [`crate::runtime`]).
pub struct VehicleLink<S, T, E> {
    settings: LinkSettings,
    exchange: ReliableExchange<S, T>,
    waypoints: WaypointDownload,
    params: ParameterDownload,
    tracker: StateTracker,
    liveness: LivenessMonitor,
    events: E,
    params_queued: bool,
    /// Newest sequence number seen per source component.
    last_seq: HashMap<u8, u8>,
    stats: LinkStats,
}

impl<S: FrameSink, T: RetryTimer, E: EventSink> VehicleLink<S, T, E> {
    pub fn new(settings: LinkSettings, sink: S, timer: T, events: E) -> Self {
        let out = Outbound::new(sink, settings.sys_id, settings.comp_id);
        Self {
            exchange: ReliableExchange::new(out, timer, settings.retry),
            waypoints: WaypointDownload::new(settings.target_sys, settings.target_comp),
            params: ParameterDownload::new(settings.target_sys, settings.target_comp, settings.param_completion),
            tracker: StateTracker::new(settings.position_window),
            liveness: LivenessMonitor::new(settings.liveness_timeout),
            events,
            params_queued: false,
            last_seq: HashMap::new(),
            stats: LinkStats::default(),
            settings,
        }
    }

    pub fn handle_frame(&mut self, raw: &[u8], now: Instant) {
        match decode(raw) {
            Ok((hdr, msg)) => self.handle_message(hdr, msg, now),
            Err(e) => {
                self.stats.malformed += 1;
                warn!("dropping frame: {}", e);
            }
        }
    }

    pub fn handle_message(&mut self, hdr: FrameHeader, msg: Message, now: Instant) {
        if hdr.system_id != self.settings.target_sys {
            self.stats.foreign += 1;
            trace!(sys = hdr.system_id, kind = ?msg.kind(), "ignoring foreign frame");
            return;
        }
        self.stats.frames += 1;
        self.track_sequence(&hdr);

        match &msg {
            Message::Heartbeat(hb) if hdr.component_id == self.settings.target_comp => {
                if let Some(p) = self.liveness.on_heartbeat(now) {
                    self.on_presence(p);
                }
                if let Some(ev) = self.tracker.on_heartbeat(hb) {
                    self.events.publish(ev);
                }
            }
            Message::StatusText(st) => {
                let ev = self.tracker.on_status_text(st);
                self.events.publish(ev);
            }
            Message::SysStatus(s) => {
                let ev = self.tracker.on_sys_status(s);
                self.events.publish(ev);
            }
            Message::GlobalPositionInt(p) => {
                if let Some(ev) = self.tracker.on_position(p, now) {
                    self.events.publish(ev);
                }
            }
            Message::MissionCount(_) | Message::MissionItem(_) => self.on_mission_message(&msg),
            Message::ParamValue(_) => {
                if let Some(table) = self.params.handle(&msg, &mut self.exchange) {
                    self.events.publish(LinkEvent::ParametersDownloaded(table));
                    self.start_queued();
                }
            }
            Message::MissionAck(ack) => {
                if self.exchange.offer(&msg).is_some() {
                    info!("guided target acknowledged ({:?})", ack.mavtype);
                    self.events.publish(LinkEvent::GuidedAck { result: ack.mavtype as u8 });
                    self.start_queued();
                } else {
                    debug!("ignoring unsolicited mission ack {:?}", ack.mavtype);
                }
            }
            other => trace!(kind = ?other.kind(), "ignoring"),
        }
    }

    pub fn retry_expired(&mut self, token: u64) {
        let RetryOutcome::Exhausted { expected, attempts } = self.exchange.retry_expired(token) else {
            return;
        };
        match expected {
            MessageKind::MissionCount | MessageKind::MissionItem => self.waypoints.fail(),
            MessageKind::ParamValue => self.params.fail(),
            _ => {}
        }
        self.events.publish(LinkEvent::ExchangeFailed { expected, attempts });
        self.start_queued();
    }

    /// Periodic housekeeping: liveness timeout and the position limiter.
    pub fn tick(&mut self, now: Instant) {
        if let Some(p) = self.liveness.poll(now) {
            self.on_presence(p);
        }
        if let Some(ev) = self.tracker.tick(now) {
            self.events.publish(ev);
        }
    }

    pub fn on_presence(&mut self, presence: Presence) {
        match presence {
            Presence::Found => {
                self.events.publish(LinkEvent::VehicleFound);
                self.start_waypoint_download();
                self.params_queued = true;
                self.start_queued();
            }
            Presence::Lost => self.events.publish(LinkEvent::VehicleLost),
        }
    }

    pub fn start_waypoint_download(&mut self) {
        if self.params.state() == ParamState::AwaitingFirst {
            // The list request is about to be superseded; ask again later.
            self.params_queued = true;
        }
        self.waypoints.start(&mut self.exchange);
    }

    /// Starts now, or after the waypoint download if one is running.
    pub fn start_parameter_download(&mut self) {
        if self.waypoints.is_active() {
            info!("params: queued behind waypoint download");
            self.params_queued = true;
            return;
        }
        self.params_queued = false;
        self.params.start(&mut self.exchange);
    }

    pub fn set_mode(&mut self, name: &str) -> Result<u32> {
        let code = mode_code(name).ok_or_else(|| FcError::UnknownMode(name.to_string()))?;
        self.ensure_present()?;
        info!("FC: requesting mode {} ({})", name, code);
        self.exchange.send(&Message::SetMode(SetMode {
            custom_mode: code,
            target_system: self.settings.target_sys,
            base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED.bits(),
        }));
        Ok(code)
    }

    pub fn set_guided(&mut self, target: &Location) -> Result<()> {
        self.ensure_present()?;
        self.interrupt_download();
        let item = MISSION_ITEM_DATA {
            x: target.lat as f32,
            y: target.lon as f32,
            z: target.relative_alt_m,
            seq: 0,
            command: MavCmd::MAV_CMD_NAV_WAYPOINT,
            target_system: self.settings.target_sys,
            target_component: self.settings.target_comp,
            frame: MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT,
            current: GUIDED_CURRENT,
            autocontinue: 0,
            ..Default::default()
        };
        info!("FC: guided to {:.6},{:.6} @ {}m", target.lat, target.lon, target.relative_alt_m);
        self.exchange.send_with_retry(Message::MissionItem(item), MessageKind::MissionAck);
        Ok(())
    }

    pub fn send_heartbeat(&mut self) {
        self.exchange.send(&Message::Heartbeat(HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_GCS,
            autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
            base_mode: MavModeFlag::empty(),
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        }));
    }

    pub fn state(&self) -> &VehicleState {
        self.tracker.state()
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    pub fn is_present(&self) -> bool {
        self.liveness.is_present()
    }

    pub fn waypoints(&self) -> &WaypointDownload {
        &self.waypoints
    }

    pub fn params(&self) -> &ParameterDownload {
        &self.params
    }

    pub fn exchange(&self) -> &ReliableExchange<S, T> {
        &self.exchange
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    fn on_mission_message(&mut self, msg: &Message) {
        match self.waypoints.handle(msg, &mut self.exchange) {
            Ok(Some(items)) => {
                self.events.publish(LinkEvent::WaypointsDownloaded(items));
                self.start_queued();
            }
            Ok(None) => {}
            Err(e) => {
                self.stats.sequence_violations += 1;
                warn!("waypoints: discarding item: {}", e);
            }
        }
    }

    /// Stop the download whose request the next exchange is about to
    /// supersede. A stopped parameter request is asked again afterwards.
    fn interrupt_download(&mut self) {
        let Some(expected) = self.exchange.pending().map(|p| p.expected) else {
            return;
        };
        match expected {
            MessageKind::MissionCount | MessageKind::MissionItem => self.waypoints.fail(),
            MessageKind::ParamValue => {
                self.params.fail();
                self.params_queued = true;
            }
            _ => return,
        }
        warn!("FC: guided target interrupts the {:?} exchange", expected);
        self.events.publish(LinkEvent::DownloadInterrupted { expected });
    }

    fn start_queued(&mut self) {
        if self.params_queued && !self.waypoints.is_active() {
            self.start_parameter_download();
        }
    }

    fn ensure_present(&self) -> Result<()> {
        if self.settings.require_heartbeat && !self.liveness.is_present() {
            return Err(FcError::NotPresent);
        }
        Ok(())
    }

    fn track_sequence(&mut self, hdr: &FrameHeader) {
        let seq = hdr.sequence;
        if let Some(&last) = self.last_seq.get(&hdr.component_id) {
            let gap = seq.wrapping_sub(last.wrapping_add(1));
            // Gaps past half the sequence space are steps backwards.
            if gap >= 0x80 {
                self.stats.out_of_order += 1;
                trace!(comp = hdr.component_id, last, seq, "sequence stepped backwards");
                return;
            }
            self.stats.lost += u64::from(gap);
        }
        self.last_seq.insert(hdr.component_id, seq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::DEFAULT_ATTEMPTS;
    use crate::testing::{frames, ManualTimer};
    use crate::waypoints::WaypointState;
    use bytes::Bytes;
    use skylink_wire::dialect::{
        MavMissionResult, MavParamType, MavSeverity, GLOBAL_POSITION_INT_DATA, MISSION_ACK_DATA, MISSION_COUNT_DATA,
        PARAM_VALUE_DATA, STATUSTEXT_DATA,
    };
    use skylink_wire::{encode, text_field};

    type Link = VehicleLink<Vec<Bytes>, ManualTimer, Vec<LinkEvent>>;

    struct Vehicle {
        seq: u8,
    }

    impl Vehicle {
        fn frame(&mut self, msg: Message) -> Bytes {
            self.frame_from(1, msg)
        }

        fn frame_from(&mut self, component_id: u8, msg: Message) -> Bytes {
            let hdr = FrameHeader { sequence: self.seq, system_id: 1, component_id };
            self.seq = self.seq.wrapping_add(1);
            encode(&hdr, &msg).unwrap()
        }
    }

    fn link(settings: LinkSettings) -> (Link, Vehicle, Instant) {
        (VehicleLink::new(settings, Vec::new(), ManualTimer::default(), Vec::new()), Vehicle { seq: 0 }, Instant::now())
    }

    fn sent(l: &Link) -> Vec<Message> {
        frames(l.exchange().outbound().sink())
    }

    fn heartbeat(mode: u32) -> Message {
        Message::Heartbeat(HEARTBEAT_DATA {
            custom_mode: mode,
            mavtype: MavType::MAV_TYPE_FIXED_WING,
            autopilot: MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA,
            ..Default::default()
        })
    }

    fn count(n: u16) -> Message {
        Message::MissionCount(MISSION_COUNT_DATA { count: n, target_system: 255, target_component: 190 })
    }

    fn item(seq: u16) -> Message {
        Message::MissionItem(MISSION_ITEM_DATA { seq, command: MavCmd::MAV_CMD_NAV_WAYPOINT, ..Default::default() })
    }

    fn param(index: u16, count: u16) -> Message {
        Message::ParamValue(PARAM_VALUE_DATA {
            param_value: 1.0,
            param_count: count,
            param_index: index,
            param_id: text_field(&format!("P{index}")),
            param_type: MavParamType::MAV_PARAM_TYPE_REAL32,
        })
    }

    fn accepted() -> Message {
        Message::MissionAck(MISSION_ACK_DATA {
            target_system: 255,
            target_component: 190,
            mavtype: MavMissionResult::MAV_MISSION_ACCEPTED,
        })
    }

    fn target() -> Location {
        Location { lat: 47.4, lon: 8.55, alt_m: 0.0, relative_alt_m: 40.0, heading_deg: None }
    }

    fn token(l: &Link) -> u64 {
        l.exchange().pending().expect("pending exchange").token
    }

    fn exhaust(l: &mut Link) {
        let t = token(l);
        for _ in 0..DEFAULT_ATTEMPTS {
            l.retry_expired(t);
        }
    }

    #[test]
    fn found_runs_waypoints_then_params() {
        let (mut l, mut v, now) = link(LinkSettings::default());
        l.handle_frame(&v.frame(heartbeat(10)), now);
        assert!(l.is_present());
        assert_eq!(l.events()[0], LinkEvent::VehicleFound);
        assert!(l.events().contains(&LinkEvent::ModeChanged("AUTO".into())));
        assert_eq!(l.waypoints().state(), WaypointState::AwaitingCount);
        assert_eq!(l.params().state(), ParamState::Idle);

        for m in [count(2), item(0), item(1)] {
            l.handle_frame(&v.frame(m), now);
        }
        assert!(l.events().iter().any(|e| matches!(e, LinkEvent::WaypointsDownloaded(items) if items.len() == 2)));
        assert_eq!(l.params().state(), ParamState::AwaitingFirst);
        assert!(matches!(sent(&l).last(), Some(Message::ParamRequestList(_))));

        for m in [param(0, 2), param(1, 2)] {
            l.handle_frame(&v.frame(m), now);
        }
        assert!(matches!(l.events().last(), Some(LinkEvent::ParametersDownloaded(t)) if t.total() == 2));
    }

    #[test]
    fn exhausted_waypoints_report_failure_and_release_params() {
        let (mut l, mut v, now) = link(LinkSettings::default());
        l.handle_frame(&v.frame(heartbeat(0)), now);
        exhaust(&mut l);
        assert_eq!(l.waypoints().state(), WaypointState::Failed);
        assert!(l.events().contains(&LinkEvent::ExchangeFailed { expected: MessageKind::MissionCount, attempts: 5 }));
        assert_eq!(l.params().state(), ParamState::AwaitingFirst);

        let list_requests = sent(&l).iter().filter(|m| matches!(m, Message::MissionRequestList(_))).count();
        assert_eq!(list_requests, 5);
    }

    #[test]
    fn exhausted_parameter_list_fails_download() {
        let (mut l, mut v, now) = link(LinkSettings::default());
        l.handle_frame(&v.frame(heartbeat(0)), now);
        l.handle_frame(&v.frame(count(0)), now);
        assert_eq!(l.params().state(), ParamState::AwaitingFirst);

        exhaust(&mut l);
        assert_eq!(l.params().state(), ParamState::Failed);
        assert_eq!(
            l.events().last(),
            Some(&LinkEvent::ExchangeFailed { expected: MessageKind::ParamValue, attempts: 5 })
        );
        assert!(l.exchange().is_idle());
        let list_requests = sent(&l).iter().filter(|m| matches!(m, Message::ParamRequestList(_))).count();
        assert_eq!(list_requests, 5);

        // Late values for the abandoned download are not applied.
        l.handle_frame(&v.frame(param(0, 1)), now);
        assert_eq!(l.params().state(), ParamState::Failed);
    }

    #[test]
    fn set_mode_sends_code() {
        let (mut l, _, _) = link(LinkSettings::default());
        assert_eq!(l.set_mode("RTL").unwrap(), 11);
        match sent(&l).as_slice() {
            [Message::SetMode(m)] => {
                assert_eq!(m.custom_mode, 11);
                assert_eq!(m.target_system, 1);
                assert_eq!(m.base_mode, MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED.bits());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_mode_sends_nothing() {
        let (mut l, _, _) = link(LinkSettings::default());
        assert!(matches!(l.set_mode("WARP"), Err(FcError::UnknownMode(m)) if m == "WARP"));
        assert_eq!(l.exchange().outbound().sent(), 0);
    }

    #[test]
    fn commands_wait_for_heartbeat_when_required() {
        let settings = LinkSettings { require_heartbeat: true, ..Default::default() };
        let (mut l, mut v, now) = link(settings);
        assert!(matches!(l.set_mode("LOITER"), Err(FcError::NotPresent)));
        l.handle_frame(&v.frame(heartbeat(0)), now);
        assert!(l.set_mode("LOITER").is_ok());
    }

    #[test]
    fn guided_target_resolved_by_ack() {
        let (mut l, mut v, now) = link(LinkSettings::default());
        l.set_guided(&target()).unwrap();
        match sent(&l).as_slice() {
            [Message::MissionItem(i)] => {
                assert_eq!(i.current, GUIDED_CURRENT);
                assert_eq!(i.frame, MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT);
                assert_eq!(i.command, MavCmd::MAV_CMD_NAV_WAYPOINT);
                assert_eq!(i.z, 40.0);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(l.exchange().pending().unwrap().expected, MessageKind::MissionAck);

        l.handle_frame(&v.frame(accepted()), now);
        assert_eq!(l.events().last(), Some(&LinkEvent::GuidedAck { result: 0 }));
        assert!(l.exchange().is_idle());

        // A second ack has nothing to resolve.
        l.handle_frame(&v.frame(accepted()), now);
        assert_eq!(l.events().len(), 1);
    }

    #[test]
    fn guided_target_interrupts_waypoints_then_params_follow_ack() {
        let (mut l, mut v, now) = link(LinkSettings::default());
        l.handle_frame(&v.frame(heartbeat(0)), now);
        assert_eq!(l.waypoints().state(), WaypointState::AwaitingCount);

        l.set_guided(&target()).unwrap();
        assert_eq!(l.waypoints().state(), WaypointState::Failed);
        assert!(l.events().contains(&LinkEvent::DownloadInterrupted { expected: MessageKind::MissionCount }));
        assert_eq!(l.params().state(), ParamState::Idle);

        l.handle_frame(&v.frame(accepted()), now);
        assert!(l.events().contains(&LinkEvent::GuidedAck { result: 0 }));
        assert_eq!(l.params().state(), ParamState::AwaitingFirst);
        assert!(matches!(sent(&l).last(), Some(Message::ParamRequestList(_))));
    }

    #[test]
    fn interrupted_parameter_request_is_asked_again() {
        let (mut l, mut v, now) = link(LinkSettings::default());
        l.handle_frame(&v.frame(heartbeat(0)), now);
        l.handle_frame(&v.frame(count(0)), now);
        assert_eq!(l.params().state(), ParamState::AwaitingFirst);

        l.set_guided(&target()).unwrap();
        assert_eq!(l.params().state(), ParamState::Failed);
        assert!(l.events().contains(&LinkEvent::DownloadInterrupted { expected: MessageKind::ParamValue }));

        l.handle_frame(&v.frame(accepted()), now);
        assert_eq!(l.params().state(), ParamState::AwaitingFirst);
    }

    #[test]
    fn idle_links_guided_target_interrupts_nothing() {
        let (mut l, _, _) = link(LinkSettings::default());
        l.set_guided(&target()).unwrap();
        assert!(l.events().is_empty());
    }

    #[test]
    fn exhausted_guided_target_reports_failure() {
        let (mut l, mut v, now) = link(LinkSettings::default());
        l.set_guided(&target()).unwrap();
        exhaust(&mut l);
        assert_eq!(
            l.events().last(),
            Some(&LinkEvent::ExchangeFailed { expected: MessageKind::MissionAck, attempts: 5 })
        );
        assert!(l.exchange().is_idle());
        let items = sent(&l).iter().filter(|m| matches!(m, Message::MissionItem(_))).count();
        assert_eq!(items, 5);

        // The ack for an abandoned target resolves nothing.
        l.handle_frame(&v.frame(accepted()), now);
        assert!(!l.events().iter().any(|e| matches!(e, LinkEvent::GuidedAck { .. })));
    }

    #[test]
    fn malformed_and_foreign_frames_are_dropped() {
        let (mut l, mut v, now) = link(LinkSettings::default());
        let mut bad = v.frame(heartbeat(0)).to_vec();
        bad[7] ^= 0xFF;
        l.handle_frame(&bad, now);

        let hdr = FrameHeader { sequence: 0, system_id: 42, component_id: 1 };
        l.handle_frame(&encode(&hdr, &heartbeat(0)).unwrap(), now);

        assert!(!l.is_present());
        assert!(l.events().is_empty());
        assert_eq!(l.stats().malformed, 1);
        assert_eq!(l.stats().foreign, 1);
    }

    #[test]
    fn telemetry_flows_while_exchange_pending() {
        let (mut l, mut v, now) = link(LinkSettings::default());
        l.handle_frame(&v.frame(heartbeat(0)), now);
        let st = Message::StatusText(STATUSTEXT_DATA {
            severity: MavSeverity::MAV_SEVERITY_INFO,
            text: text_field("EKF3 IMU0 is using GPS"),
        });
        l.handle_frame(&v.frame(st), now);
        let pos = Message::GlobalPositionInt(GLOBAL_POSITION_INT_DATA { lat: 1, lon: 2, hdg: u16::MAX, ..Default::default() });
        l.handle_frame(&v.frame(pos), now);
        l.tick(now + DEFAULT_POSITION_WINDOW);

        assert!(l.events().contains(&LinkEvent::StatusChanged("EKF3 IMU0 is using GPS".into())));
        assert!(l.events().iter().any(|e| matches!(e, LinkEvent::LocationChanged(_))));
        assert_eq!(l.exchange().pending().unwrap().expected, MessageKind::MissionCount);
    }

    #[test]
    fn liveness_timeout_publishes_lost() {
        let (mut l, mut v, now) = link(LinkSettings::default());
        l.handle_frame(&v.frame(heartbeat(0)), now);
        l.tick(now + DEFAULT_LIVENESS_TIMEOUT);
        assert_eq!(l.events().last(), Some(&LinkEvent::VehicleLost));
        assert!(!l.is_present());
    }

    #[test]
    fn parameter_request_queued_behind_waypoints() {
        let (mut l, mut v, now) = link(LinkSettings::default());
        l.start_waypoint_download();
        l.start_parameter_download();
        assert_eq!(l.params().state(), ParamState::Idle);
        l.handle_frame(&v.frame(count(0)), now);
        assert_eq!(l.params().state(), ParamState::AwaitingFirst);
    }

    #[test]
    fn lost_frames_counted_from_sequence() {
        let (mut l, mut v, now) = link(LinkSettings::default());
        l.handle_frame(&v.frame(heartbeat(0)), now);
        v.seq = v.seq.wrapping_add(3);
        l.handle_frame(&v.frame(heartbeat(0)), now);
        assert_eq!(l.stats().lost, 3);
        assert_eq!(l.stats().frames, 2);
    }

    #[test]
    fn sequence_tracked_per_component() {
        let (mut l, _, now) = link(LinkSettings::default());
        // Autopilot and a companion computer interleave independent counters.
        let mut autopilot = Vehicle { seq: 10 };
        let mut companion = Vehicle { seq: 200 };
        for _ in 0..3 {
            l.handle_frame(&autopilot.frame(heartbeat(0)), now);
            l.handle_frame(&companion.frame_from(191, heartbeat(0)), now);
        }
        assert_eq!(l.stats().frames, 6);
        assert_eq!(l.stats().lost, 0);
    }

    #[test]
    fn duplicate_and_reordered_frames_are_not_lost() {
        let (mut l, mut v, now) = link(LinkSettings::default());
        let first = v.frame(heartbeat(0));
        let second = v.frame(heartbeat(0));
        let third = v.frame(heartbeat(0));

        l.handle_frame(&first, now);
        l.handle_frame(&third, now);
        assert_eq!(l.stats().lost, 1);

        // Late arrival of 1, then a duplicate of 2.
        l.handle_frame(&second, now);
        l.handle_frame(&third, now);
        assert_eq!(l.stats().lost, 1);
        assert_eq!(l.stats().out_of_order, 2);

        // The newest sequence number survived the backwards steps.
        l.handle_frame(&v.frame(heartbeat(0)), now);
        assert_eq!(l.stats().lost, 1);
    }
}
