use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::PlantDescriptor;
use crate::election::bid::draw_bid;

/// Plant lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlantStatus {
    Idle,
    Electing,
    Producing,
}

impl std::fmt::Display for PlantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlantStatus::Idle => write!(f, "idle"),
            PlantStatus::Electing => write!(f, "electing"),
            PlantStatus::Producing => write!(f, "producing"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Election,
    Elected,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Election => write!(f, "election"),
            TokenKind::Elected => write!(f, "elected"),
        }
    }
}

/// A single hop of the ring auction. Never mutated in place: every forward
/// builds a new value.
#[derive(Debug, Clone, PartialEq)]
pub struct ElectionToken {
    pub kind: TokenKind,
    pub sender_id: String,
    pub sender_tiebreak: u64,
    pub request_id: Uuid,
    pub bid_price: f64,
    pub amount_kwh: f64,
    pub sent_at: DateTime<Utc>,
}

impl ElectionToken {
    /// First token of an election, built by the initiator.
    pub fn opening(sender: &PlantDescriptor, request_id: Uuid, bid_price: f64, amount_kwh: f64) -> Self {
        Self {
            kind: TokenKind::Election,
            sender_id: sender.plant_id.clone(),
            sender_tiebreak: sender.tiebreak,
            request_id,
            bid_price,
            amount_kwh,
            sent_at: Utc::now(),
        }
    }

    /// Same election, this plant's bid substituted for the beaten one.
    pub fn with_own_bid(&self, me: &PlantDescriptor, bid: f64) -> Self {
        Self {
            kind: TokenKind::Election,
            sender_id: me.plant_id.clone(),
            sender_tiebreak: me.tiebreak,
            request_id: self.request_id,
            bid_price: bid,
            amount_kwh: self.amount_kwh,
            sent_at: Utc::now(),
        }
    }

    /// Announcement lap: the surviving sender and price, flipped to Elected.
    pub fn as_elected(&self) -> Self {
        Self {
            kind: TokenKind::Elected,
            sender_id: self.sender_id.clone(),
            sender_tiebreak: self.sender_tiebreak,
            request_id: self.request_id,
            bid_price: self.bid_price,
            amount_kwh: self.amount_kwh,
            sent_at: Utc::now(),
        }
    }
}

/// What the coordinator must do with an evaluated token.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Relay the token untouched; the received bid stands.
    ForwardUnchanged,
    /// Replace sender and price with this plant's own bid.
    ForwardWithOwnBid { bid: f64 },
    /// Own Election token came back undefeated: announce the winner.
    AnnounceWin,
    /// Relay the winner announcement untouched.
    ForwardElected,
    /// Stray announcement for an election this plant already closed.
    Drop,
    /// This plant is the winner.
    IWon,
}

impl Action {
    /// Terminal actions end the election at this node: the request id goes
    /// into the processed set and later deliveries are ignored. AnnounceWin
    /// is NOT terminal — the initiator keeps the election open until its own
    /// Elected token completes the announcement lap.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Action::ForwardElected | Action::Drop | Action::IWon)
    }
}

/// How an introduce message changed the local neighbor links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingUpdate {
    /// Was alone, the candidate is now both neighbors.
    AdoptedBoth,
    /// This plant is the candidate's claimed successor: prev <- candidate.
    BecamePredecessorOfUs,
    /// This plant is the candidate's claimed predecessor: next <- candidate.
    BecameSuccessorOfUs,
    Unchanged,
}

/// Stall observability: the protocol's drop-once semantics are not
/// reordering-safe, so the counters make a stuck election visible instead of
/// papering over it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElectionStats {
    pub started: u64,
    pub won: u64,
    pub relayed: u64,
    pub dropped: u64,
}

/// Per-plant election and topology state.
///
/// # Invariants
///
/// ## Single claimant
/// A demand is claimed by the plant whose id matches the sender of the
/// surviving Elected token; everyone else clears tracking as the
/// announcement passes through. `evaluate` never produces `IWon` for a
/// request this plant is not tracking.
///
/// ## Alone
/// `next == None && prev == None` exactly when the plant is the only ring
/// member. A lone plant never evaluates tokens.
///
/// ## Bid lifecycle
/// `current_bid` is 0.0 between elections, drawn lazily on the first
/// encounter of a request (uniform in [0.10, 0.90], two decimals), and reset
/// on production end or when an announcement clears tracking.
///
/// ## Producing passthrough
/// While `Producing`, every token is forwarded unchanged and no local field
/// moves; the plant re-enters the auction only after reset.
///
/// ## Tracking window
/// `status ∈ {Electing, Producing}` implies `current_request` is set. The
/// converse is deliberately loose in two places the protocol relies on:
/// after `AnnounceWin` the initiator sits `Idle` while still tracking the
/// request until its own Elected token returns, and an equal-bid evaluation
/// leaves status untouched.
#[derive(Debug)]
pub struct PlantState {
    pub descriptor: PlantDescriptor,
    pub status: PlantStatus,
    pub current_request: Option<Uuid>,
    pub current_bid: f64,
    pub next: Option<PlantDescriptor>,
    pub prev: Option<PlantDescriptor>,
    /// Set while a neighbor swap is in flight; election steps wait on it.
    pub topology_in_flight: bool,
    pub stats: ElectionStats,
}

impl PlantState {
    pub fn new(descriptor: PlantDescriptor) -> Self {
        Self {
            descriptor,
            status: PlantStatus::Idle,
            current_request: None,
            current_bid: 0.0,
            next: None,
            prev: None,
            topology_in_flight: false,
            stats: ElectionStats::default(),
        }
    }

    pub fn plant_id(&self) -> &str {
        &self.descriptor.plant_id
    }

    pub fn is_alone(&self) -> bool {
        self.next.is_none() && self.prev.is_none()
    }

    /// Begin this plant's own election for `request_id`: track it, go
    /// Electing, draw a fresh bid. Returns the successor to send the opening
    /// token to, or `None` when the plant is alone and the token protocol is
    /// skipped entirely.
    pub fn start_election(&mut self, request_id: Uuid) -> Option<PlantDescriptor> {
        self.current_request = Some(request_id);
        self.status = PlantStatus::Electing;
        self.current_bid = draw_bid();
        self.stats.started += 1;
        self.next.clone()
    }

    /// Decide what to do with an inbound token. Pure transition: no I/O, no
    /// waiting; the caller owns latency simulation and action execution.
    pub fn evaluate(&mut self, token: &ElectionToken) -> Action {
        // A producing plant is out of the auction: everything passes through.
        if self.status == PlantStatus::Producing {
            return Action::ForwardUnchanged;
        }

        // Announcement for an election this plant already relayed and
        // cleared: the flood has gone full circle, stop it here.
        if token.kind == TokenKind::Elected && self.current_request.is_none() {
            self.stats.dropped += 1;
            return Action::Drop;
        }

        if let Some(current) = self.current_request {
            if token.kind == TokenKind::Elected && current == token.request_id {
                if token.sender_id == self.descriptor.plant_id {
                    self.status = PlantStatus::Producing;
                    self.stats.won += 1;
                    return Action::IWon;
                }
                // Someone else won: clear tracking and relay the news.
                self.status = PlantStatus::Idle;
                self.current_request = None;
                self.current_bid = 0.0;
                self.stats.relayed += 1;
                return Action::ForwardElected;
            }

            if token.kind == TokenKind::Election
                && current == token.request_id
                && token.sender_id == self.descriptor.plant_id
            {
                // Our own token survived a full revolution undefeated.
                // Tracking stays so the returning Elected token hits IWon.
                self.status = PlantStatus::Idle;
                return Action::AnnounceWin;
            }
        }

        self.bidding_step(token)
    }

    fn bidding_step(&mut self, token: &ElectionToken) -> Action {
        if self.current_request.is_none() {
            self.current_request = Some(token.request_id);
        }
        if self.current_bid == 0.0 {
            self.current_bid = draw_bid();
        }

        // Busy with a different election: propagate without joining.
        if self.current_request != Some(token.request_id) {
            return Action::ForwardUnchanged;
        }

        if token.bid_price < self.current_bid {
            self.status = PlantStatus::Electing;
            return Action::ForwardUnchanged;
        }
        if token.bid_price > self.current_bid {
            self.status = PlantStatus::Electing;
            return Action::ForwardWithOwnBid { bid: self.current_bid };
        }

        // Equal bids: the smaller tiebreak takes the token over.
        if self.descriptor.tiebreak < token.sender_tiebreak {
            Action::ForwardWithOwnBid { bid: self.current_bid }
        } else {
            Action::ForwardUnchanged
        }
    }

    /// Production finished: back to the pool.
    pub fn reset_after_production(&mut self) {
        self.status = PlantStatus::Idle;
        self.current_request = None;
        self.current_bid = 0.0;
    }

    /// Apply an introduce flood step for `candidate`, which claims
    /// `successor_hint`/`predecessor_hint` as its registry-assigned
    /// neighbors. Pure: the caller wraps this in the topology gate and
    /// decides propagation separately.
    pub fn apply_introduce(
        &mut self,
        candidate: &PlantDescriptor,
        successor_hint: &str,
        predecessor_hint: &str,
    ) -> RingUpdate {
        if self.is_alone() {
            self.next = Some(candidate.clone());
            self.prev = Some(candidate.clone());
            return RingUpdate::AdoptedBoth;
        }
        if self.descriptor.plant_id == successor_hint {
            self.prev = Some(candidate.clone());
            return RingUpdate::BecamePredecessorOfUs;
        }
        if self.descriptor.plant_id == predecessor_hint {
            self.next = Some(candidate.clone());
            return RingUpdate::BecameSuccessorOfUs;
        }
        RingUpdate::Unchanged
    }

    /// Whether an introduce flood for `candidate` keeps travelling: it stops
    /// once the next hop is the inserted plant itself.
    pub fn should_propagate_introduce(&self, candidate_id: &str) -> bool {
        match &self.next {
            Some(next) => next.plant_id != candidate_id,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: u64) -> PlantDescriptor {
        PlantDescriptor::new(id.to_string(), id, "127.0.0.1", 50000 + id as u16)
    }

    fn state(id: u64) -> PlantState {
        PlantState::new(descriptor(id))
    }

    fn election_token(sender: u64, request_id: Uuid, bid: f64) -> ElectionToken {
        ElectionToken::opening(&descriptor(sender), request_id, bid, 8000.0)
    }

    #[test]
    fn new_state_is_idle_and_alone() {
        let s = state(1);
        assert_eq!(s.status, PlantStatus::Idle);
        assert!(s.current_request.is_none());
        assert_eq!(s.current_bid, 0.0);
        assert!(s.is_alone());
    }

    #[test]
    fn start_election_draws_bid_and_tracks() {
        let mut s = state(1);
        s.next = Some(descriptor(2));
        s.prev = Some(descriptor(2));
        let request = Uuid::new_v4();

        let successor = s.start_election(request);
        assert_eq!(successor.unwrap().plant_id, "2");
        assert_eq!(s.status, PlantStatus::Electing);
        assert_eq!(s.current_request, Some(request));
        assert!(s.current_bid >= 0.10 && s.current_bid <= 0.90);
        assert_eq!(s.stats.started, 1);
    }

    #[test]
    fn start_election_alone_returns_no_successor() {
        let mut s = state(1);
        let successor = s.start_election(Uuid::new_v4());
        assert!(successor.is_none());
    }

    #[test]
    fn lower_inbound_bid_forwards_unchanged() {
        let mut s = state(2);
        s.current_bid = 0.55;
        let request = Uuid::new_v4();
        let action = s.evaluate(&election_token(1, request, 0.10));
        assert_eq!(action, Action::ForwardUnchanged);
        assert_eq!(s.status, PlantStatus::Electing);
        assert_eq!(s.current_request, Some(request));
        assert_eq!(s.current_bid, 0.55);
    }

    #[test]
    fn higher_inbound_bid_is_replaced_with_own() {
        let mut s = state(2);
        s.current_bid = 0.30;
        let action = s.evaluate(&election_token(1, Uuid::new_v4(), 0.55));
        assert_eq!(action, Action::ForwardWithOwnBid { bid: 0.30 });
        assert_eq!(s.status, PlantStatus::Electing);
    }

    #[test]
    fn replacing_is_idempotent_while_already_electing() {
        let mut s = state(2);
        s.current_bid = 0.30;
        let request = Uuid::new_v4();
        let token = election_token(1, request, 0.55);
        assert_eq!(s.evaluate(&token), Action::ForwardWithOwnBid { bid: 0.30 });
        // Duplicate delivery of the same beaten token makes the same call.
        assert_eq!(s.evaluate(&token), Action::ForwardWithOwnBid { bid: 0.30 });
        assert_eq!(s.status, PlantStatus::Electing);
    }

    #[test]
    fn equal_bids_break_on_tiebreak() {
        let request = Uuid::new_v4();

        let mut small = state(1);
        small.current_bid = 0.40;
        assert_eq!(
            small.evaluate(&election_token(5, request, 0.40)),
            Action::ForwardWithOwnBid { bid: 0.40 }
        );

        let mut large = state(9);
        large.current_bid = 0.40;
        assert_eq!(
            large.evaluate(&election_token(5, request, 0.40)),
            Action::ForwardUnchanged
        );
    }

    #[test]
    fn tie_evaluation_leaves_status_untouched() {
        let mut s = state(9);
        s.current_bid = 0.40;
        s.evaluate(&election_token(5, Uuid::new_v4(), 0.40));
        assert_eq!(s.status, PlantStatus::Idle);
        assert!(s.current_request.is_some());
    }

    #[test]
    fn first_encounter_begins_tracking_and_draws_bid() {
        let mut s = state(2);
        let request = Uuid::new_v4();
        s.evaluate(&election_token(1, request, 0.50));
        assert_eq!(s.current_request, Some(request));
        assert!(s.current_bid >= 0.10 && s.current_bid <= 0.90);
    }

    #[test]
    fn token_for_other_request_passes_through_without_joining() {
        let mut s = state(2);
        let mine = Uuid::new_v4();
        s.current_request = Some(mine);
        s.current_bid = 0.20;
        s.status = PlantStatus::Electing;

        let action = s.evaluate(&election_token(1, Uuid::new_v4(), 0.50));
        assert_eq!(action, Action::ForwardUnchanged);
        assert_eq!(s.current_request, Some(mine));
        assert_eq!(s.current_bid, 0.20);
    }

    #[test]
    fn producing_plant_always_forwards_unchanged() {
        let mut s = state(2);
        s.status = PlantStatus::Producing;
        s.current_request = Some(Uuid::new_v4());
        s.current_bid = 0.33;

        let other = Uuid::new_v4();
        assert_eq!(s.evaluate(&election_token(1, other, 0.90)), Action::ForwardUnchanged);
        let mut elected = election_token(1, other, 0.90);
        elected.kind = TokenKind::Elected;
        assert_eq!(s.evaluate(&elected), Action::ForwardUnchanged);
        assert_eq!(s.current_bid, 0.33);
        assert_eq!(s.status, PlantStatus::Producing);
    }

    #[test]
    fn own_token_returning_announces_win() {
        let mut s = state(1);
        s.next = Some(descriptor(2));
        s.prev = Some(descriptor(2));
        let request = Uuid::new_v4();
        s.start_election(request);
        let bid = s.current_bid;

        let mut own = election_token(1, request, bid);
        own.sender_tiebreak = 1;
        let action = s.evaluate(&own);
        assert_eq!(action, Action::AnnounceWin);
        // Still tracking, so the returning Elected token resolves to IWon.
        assert_eq!(s.status, PlantStatus::Idle);
        assert_eq!(s.current_request, Some(request));
    }

    #[test]
    fn elected_token_for_self_is_a_win() {
        let mut s = state(1);
        let request = Uuid::new_v4();
        s.current_request = Some(request);
        s.current_bid = 0.10;

        let mut token = election_token(1, request, 0.10);
        token.kind = TokenKind::Elected;
        assert_eq!(s.evaluate(&token), Action::IWon);
        assert_eq!(s.status, PlantStatus::Producing);
        assert_eq!(s.stats.won, 1);
    }

    #[test]
    fn elected_token_for_other_clears_tracking() {
        let mut s = state(2);
        let request = Uuid::new_v4();
        s.current_request = Some(request);
        s.current_bid = 0.80;
        s.status = PlantStatus::Electing;

        let mut token = election_token(1, request, 0.10);
        token.kind = TokenKind::Elected;
        assert_eq!(s.evaluate(&token), Action::ForwardElected);
        assert_eq!(s.status, PlantStatus::Idle);
        assert!(s.current_request.is_none());
        assert_eq!(s.current_bid, 0.0);
        assert_eq!(s.stats.relayed, 1);
    }

    #[test]
    fn stray_elected_token_is_dropped() {
        let mut s = state(2);
        let mut token = election_token(1, Uuid::new_v4(), 0.10);
        token.kind = TokenKind::Elected;
        assert_eq!(s.evaluate(&token), Action::Drop);
        assert_eq!(s.stats.dropped, 1);
        // No forward, no second win: dropping again is stable.
        assert_eq!(s.evaluate(&token), Action::Drop);
    }

    #[test]
    fn reset_after_production_rejoins_pool() {
        let mut s = state(1);
        s.status = PlantStatus::Producing;
        s.current_request = Some(Uuid::new_v4());
        s.current_bid = 0.42;
        s.reset_after_production();
        assert_eq!(s.status, PlantStatus::Idle);
        assert!(s.current_request.is_none());
        assert_eq!(s.current_bid, 0.0);
    }

    #[test]
    fn introduce_adopts_candidate_when_alone() {
        let mut s = state(1);
        let j = descriptor(9);
        assert_eq!(s.apply_introduce(&j, "1", "1"), RingUpdate::AdoptedBoth);
        assert_eq!(s.next.as_ref().unwrap().plant_id, "9");
        assert_eq!(s.prev.as_ref().unwrap().plant_id, "9");
    }

    #[test]
    fn introduce_updates_prev_when_we_are_claimed_successor() {
        let mut s = state(2);
        s.next = Some(descriptor(3));
        s.prev = Some(descriptor(1));
        let j = descriptor(9);
        assert_eq!(s.apply_introduce(&j, "2", "1"), RingUpdate::BecamePredecessorOfUs);
        assert_eq!(s.prev.as_ref().unwrap().plant_id, "9");
        assert_eq!(s.next.as_ref().unwrap().plant_id, "3");
    }

    #[test]
    fn introduce_updates_next_when_we_are_claimed_predecessor() {
        let mut s = state(1);
        s.next = Some(descriptor(2));
        s.prev = Some(descriptor(3));
        let j = descriptor(9);
        assert_eq!(s.apply_introduce(&j, "2", "1"), RingUpdate::BecameSuccessorOfUs);
        assert_eq!(s.next.as_ref().unwrap().plant_id, "9");
    }

    #[test]
    fn introduce_elsewhere_in_ring_changes_nothing() {
        let mut s = state(5);
        s.next = Some(descriptor(6));
        s.prev = Some(descriptor(4));
        let j = descriptor(9);
        assert_eq!(s.apply_introduce(&j, "2", "1"), RingUpdate::Unchanged);
        assert_eq!(s.next.as_ref().unwrap().plant_id, "6");
        assert_eq!(s.prev.as_ref().unwrap().plant_id, "4");
    }

    #[test]
    fn introduce_flood_stops_at_inserted_plant() {
        let mut s = state(1);
        s.next = Some(descriptor(9));
        assert!(!s.should_propagate_introduce("9"));
        s.next = Some(descriptor(2));
        assert!(s.should_propagate_introduce("9"));
    }
}
