/// Classification for retry policy.
///
/// Used to determine how the resolver should respond to errors from providers.
///
/// # Behavior Summary
///
/// | Class | Try Next Provider? | Record Circuit Breaker Failure? |
/// |-------|-------------------|--------------------------------|
/// | `Never` | No | No |
/// | `FailoverWithPenalty` | Yes | Yes (short disable once the threshold is met) |
/// | `Disable` | Yes | Yes (opens immediately with the long entitlement disable) |
/// | `NextProvider` | Yes | No |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Never retry - terminal failure of the whole request.
    Never,

    /// Failover to next provider and record a circuit breaker penalty.
    ///
    /// Used for transient errors: timeouts, 5xx, upstream rate limiting and
    /// malformed payloads. After enough failures the circuit opens and the
    /// provider is excluded for the generic disable duration.
    FailoverWithPenalty,

    /// Failover to next provider and disable this one for the long
    /// entitlement duration.
    ///
    /// Plan/permission restrictions do not clear on their own, so waiting the
    /// short generic timeout would only burn requests.
    Disable,

    /// Try next provider without recording any penalty.
    ///
    /// Used when this provider can't serve the request (unknown symbol,
    /// unsupported operation, local call budget exhausted) but another
    /// provider might.
    NextProvider,
}
