//! Action plan generation
//!
//! Every intent is drawn independently: a probability is sampled uniformly
//! from the intent's range, then a Bernoulli trial is run with it.

use mailwarm_common::WarmupActionPlan;
use rand::Rng;

const MARK_READ: (f64, f64) = (0.50, 0.70);
const SEND_REPLY: (f64, f64) = (0.20, 0.40);
const MARK_IMPORTANT: (f64, f64) = (0.05, 0.15);
const ADD_STAR: (f64, f64) = (0.03, 0.07);
const ARCHIVE: (f64, f64) = (0.10, 0.25);
const DELETE: (f64, f64) = (0.05, 0.15);
const RESCUE_FROM_SPAM: (f64, f64) = (0.60, 0.90);

/// Added to the important probability when a reply is planned
const REPLY_IMPORTANT_BOOST: f64 = 0.20;

const GRACE_LIMIT_RANGE: std::ops::RangeInclusive<i32> = 5..=10;

fn sample_probability<R: Rng + ?Sized>(rng: &mut R, (low, high): (f64, f64)) -> f64 {
    rng.gen_range(low..=high)
}

fn chance<R: Rng + ?Sized>(rng: &mut R, range: (f64, f64)) -> bool {
    let p = sample_probability(rng, range);
    rng.gen_bool(p)
}

/// Draw a fresh plan for one warmup message
pub fn generate_plan<R: Rng + ?Sized>(rng: &mut R) -> WarmupActionPlan {
    let mark_read = chance(rng, MARK_READ);
    let send_reply = chance(rng, SEND_REPLY);

    let mut important = sample_probability(rng, MARK_IMPORTANT);
    if send_reply {
        important = (important + REPLY_IMPORTANT_BOOST).min(1.0);
    }
    let mark_important = rng.gen_bool(important);

    WarmupActionPlan {
        mark_read,
        send_reply,
        mark_important,
        add_star: chance(rng, ADD_STAR),
        archive: chance(rng, ARCHIVE),
        delete: chance(rng, DELETE),
        rescue_from_spam: chance(rng, RESCUE_FROM_SPAM),
        important_star_grace_limit: rng.gen_range(GRACE_LIMIT_RANGE),
    }
}
