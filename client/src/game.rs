use log::debug;
use shared::{common_symbol, Card, Symbol, TableView};

/// Client-side mirror of what the server has told this player so far.
#[derive(Debug, Clone, Default)]
pub struct ClientGameState {
    pub player_id: String,
    pub table: Option<TableView>,
    pub target_card: Card,
    pub top_card: Card,
    pub round: u32,
    /// Round the last click was sent for, to avoid claiming twice.
    clicked_round: Option<u32>,
    start_requested: bool,
}

impl ClientGameState {
    pub fn new(player_id: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            ..Self::default()
        }
    }

    pub fn apply_state(&mut self, table: TableView) {
        if table.started {
            self.target_card = table.target_card.clone();
        }
        // A state can overtake the matching update; never move the round back.
        self.round = self.round.max(table.round);
        self.table = Some(table);
    }

    pub fn apply_update(&mut self, target_card: Card, top_card: Card, round: u32, winner_id: &str) {
        if !winner_id.is_empty() {
            debug!("Round {} won by {}", round.saturating_sub(1), winner_id);
        }
        self.target_card = target_card;
        self.top_card = top_card;
        self.round = round;
    }

    pub fn is_creator(&self) -> bool {
        self.table
            .as_ref()
            .and_then(TableView::creator)
            .is_some_and(|p| p.id == self.player_id)
    }

    pub fn is_started(&self) -> bool {
        self.table.as_ref().is_some_and(|t| t.started)
    }

    pub fn is_finished(&self) -> bool {
        self.table.as_ref().is_some_and(|t| t.finished)
    }

    pub fn winner_id(&self) -> Option<&str> {
        self.table.as_ref().and_then(|t| t.winner_id.as_deref())
    }

    pub fn score(&self) -> Option<usize> {
        self.table
            .as_ref()?
            .players
            .iter()
            .find(|p| p.id == self.player_id)
            .map(|p| p.score)
    }

    /// True once, when this player created the table and at least
    /// `start_when` players are seated.
    pub fn take_start(&mut self, start_when: Option<usize>) -> bool {
        let Some(wanted) = start_when else {
            return false;
        };
        let seated = self.table.as_ref().map_or(0, |t| t.players.len());
        if self.start_requested || self.is_started() || !self.is_creator() || seated < wanted {
            return false;
        }
        self.start_requested = true;
        true
    }

    /// The symbol to claim this round, at most once per round.
    pub fn take_click(&mut self) -> Option<(Symbol, u32)> {
        if !self.is_started() || self.is_finished() || self.clicked_round == Some(self.round) {
            return None;
        }
        let symbol = common_symbol(&self.top_card, &self.target_card)?;
        self.clicked_round = Some(self.round);
        Some((symbol, self.round))
    }
}
