//! Fixed briefs for the three evaluator roles.
//!
//! Each brief is sent as the `instructions` field of an
//! [`EvaluationRequest`](crate::models::EvaluationRequest). The shape of the
//! expected reply is the same for every role so a single parser handles them.

use crate::models::EvaluatorRole;

/// Reply format shared by every role.
pub const OUTPUT_CONTRACT: &str = r#"<output_format>
Reply with a single JSON object and nothing else:
{
  "role": "<your role>",
  "merge_score": <integer 0-10 or null>,
  "summary": "<two or three sentences>",
  "pair_verdicts": [
    {
      "units": ["<unit a>", "<unit b>"],
      "kind": "MERGE" | "KEEP" | "SPLIT" | "RETIRE",
      "confidence": "high" | "medium" | "low",
      "reasoning": "<why>",
      "proposed_id": "<merged id, MERGE only>",
      "subject": "<unit acted on, SPLIT and RETIRE only>",
      "split_parts": [{"id": "<new id>", "triggers": ["..."], "sections": ["<## heading>"]}]
    }
  ]
}
</output_format>"#;

/// Brief for the consolidator.
pub const CONSOLIDATOR_BRIEF: &str = r"<role>consolidator</role>
<task>
You argue for merging. Examine the units of the cluster and build the strongest
honest case that they should become one unit: shared trigger phrases a user could
not tell apart, duplicated workflow steps, identical tool profiles, the same
objects being operated on.

Score the merge case from 0 (no overlap worth merging) to 10 (the units are
interchangeable) in `merge_score`. Leave `pair_verdicts` empty.
</task>";

/// Brief for the preservationist.
pub const PRESERVATIONIST_BRIEF: &str = r"<role>preservationist</role>
<task>
You argue for keeping units separate. Build the strongest honest case that each
unit earns its place: distinct objects operated on, different audiences, workflows
that only look alike, a merged unit that would grow too large to load.

Score the keep case from 0 (nothing distinguishes them) to 10 (clearly distinct)
in `merge_score`. Leave `pair_verdicts` empty.
</task>";

/// Brief for the synthesizer.
pub const SYNTHESIZER_BRIEF: &str = r"<role>synthesizer</role>
<task>
You are neutral. You receive the consolidator and preservationist outputs in
`prior_outputs`. Weigh both arguments against the unit excerpts and pair scores
and emit one verdict per pair you have an opinion on. Prefer KEEP when the
arguments are balanced. Propose a merged identifier for every MERGE, name the
`subject` of every SPLIT or RETIRE, and list the parts of every SPLIT.
</task>";

/// Returns the full brief for a role, including the reply format.
#[must_use]
pub fn brief_for(role: EvaluatorRole) -> String {
    let brief = match role {
        EvaluatorRole::Consolidator => CONSOLIDATOR_BRIEF,
        EvaluatorRole::Preservationist => PRESERVATIONIST_BRIEF,
        EvaluatorRole::Synthesizer => SYNTHESIZER_BRIEF,
    };
    format!("{brief}\n\n{OUTPUT_CONTRACT}")
}
