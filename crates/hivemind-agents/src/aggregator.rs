use std::collections::HashMap;

use chrono::{DateTime, Utc};
use hivemind_models::{Action, AgentResponse, ConsensusConfig, ConsensusResult, Decision, VoteBreakdown};
use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places kept in reported confidence, confluence, and breakdown values.
pub const OUTPUT_DP: u32 = 6;

/// Combine a round's responses into one decision.
///
/// Pure: the same responses, weights, policy, and timestamp always produce the
/// same result. Only `SUCCESS` responses from agents present in `weights` vote;
/// everything else contributes neither weight nor vote.
///
/// Gating is decided on exact values; reported values are rounded afterwards.
pub fn aggregate(
    responses: &[AgentResponse],
    weights: &HashMap<String, Decimal>,
    policy: &ConsensusConfig,
    timestamp: DateTime<Utc>,
) -> ConsensusResult {
    let tally = Tally::collect(responses, weights);

    let abstain = |breakdown: VoteBreakdown| ConsensusResult {
        action: Decision::Abstain,
        confidence: Decimal::ZERO,
        confluence: Decimal::ZERO,
        vote_breakdown: breakdown,
        participating_agents: tally.participating,
        quorum_met: false,
        timestamp,
    };

    if tally.total_weight.is_zero() {
        return abstain(VoteBreakdown::default());
    }

    let scores = tally.scores();
    let breakdown = round_breakdown(tally.breakdown(&scores));

    if (tally.participating as usize) < policy.min_quorum {
        return abstain(breakdown);
    }

    let (winner, top, second) = rank(&scores);
    let confluence = if top > Decimal::ZERO {
        (top - second) / top
    } else {
        Decimal::ZERO
    };

    // Equal top-two scores always abstain, whatever min_confluence is.
    let contested = top == second;
    let action = if contested || top < policy.min_confidence || confluence < policy.min_confluence {
        policy.below_threshold_action.into()
    } else {
        Decision::from(winner)
    };

    ConsensusResult {
        action,
        confidence: round(top),
        confluence: round(confluence),
        vote_breakdown: breakdown,
        participating_agents: tally.participating,
        quorum_met: true,
        timestamp,
    }
}

/// Weighted votes of the successful responses.
struct Tally {
    participating: u32,
    total_weight: Decimal,
    /// Σ weight × confidence per action.
    weighted: VoteBreakdown,
    /// Σ weight per action.
    weight_share: VoteBreakdown,
}

impl Tally {
    fn collect(responses: &[AgentResponse], weights: &HashMap<String, Decimal>) -> Self {
        let mut tally = Tally {
            participating: 0,
            total_weight: Decimal::ZERO,
            weighted: VoteBreakdown::default(),
            weight_share: VoteBreakdown::default(),
        };

        for response in responses.iter().filter(|r| r.is_success()) {
            let Some(&weight) = weights.get(&response.agent_id) else {
                continue;
            };
            let action = response.parsed_action;
            // Saturate rather than panic on weights beyond what config validation allows.
            tally.participating += 1;
            tally.total_weight = tally.total_weight.saturating_add(weight);
            tally.weighted.set(
                action,
                tally
                    .weighted
                    .get(action)
                    .saturating_add(weight.saturating_mul(response.parsed_confidence)),
            );
            tally
                .weight_share
                .set(action, tally.weight_share.get(action).saturating_add(weight));
        }

        tally
    }

    /// score(a) = Σ weight × confidence of a-votes / total weight
    fn scores(&self) -> VoteBreakdown {
        let mut scores = VoteBreakdown::default();
        for action in Action::ALL {
            scores.set(action, self.weighted.get(action) / self.total_weight);
        }
        scores
    }

    /// Scores normalised to sum to 1. Falls back to weight share when every vote
    /// carried zero confidence.
    fn breakdown(&self, scores: &VoteBreakdown) -> VoteBreakdown {
        let (source, total) = if scores.total() > Decimal::ZERO {
            (scores, scores.total())
        } else {
            (&self.weight_share, self.total_weight)
        };

        let mut breakdown = VoteBreakdown::default();
        for action in Action::ALL {
            breakdown.set(action, source.get(action) / total);
        }
        breakdown
    }
}

/// Winner, top score, and runner-up score. Ties for the top go to the first
/// action in BUY, SELL, HOLD order.
fn rank(scores: &VoteBreakdown) -> (Action, Decimal, Decimal) {
    let mut ordered: Vec<(Action, Decimal)> =
        Action::ALL.iter().map(|&a| (a, scores.get(a))).collect();
    // Stable sort keeps BUY, SELL, HOLD order among equal scores.
    ordered.sort_by(|a, b| b.1.cmp(&a.1));
    (ordered[0].0, ordered[0].1, ordered[1].1)
}

fn round(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(OUTPUT_DP, RoundingStrategy::MidpointAwayFromZero)
}

fn round_breakdown(breakdown: VoteBreakdown) -> VoteBreakdown {
    VoteBreakdown {
        buy: round(breakdown.buy),
        sell: round(breakdown.sell),
        hold: round(breakdown.hold),
    }
}
