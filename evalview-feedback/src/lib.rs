// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Evalview Feedback
//!
//! Background submission of reviewer feedback, template validation of
//! reviewer answers and in-cell text annotations.

pub mod annotations;
pub mod error;
pub mod queue;
pub mod submitter;
pub mod template;

pub use annotations::{Annotation, AnnotationBoard, HighlightRange};
pub use error::{Result, SubmitError};
pub use queue::{QueueConfig, QueueStats, Submission, SubmissionOutcome, SubmissionQueue};
pub use submitter::{FeedbackSubmitter, HttpFeedbackSubmitter};
pub use template::{build_submission, USER_FEEDBACK_TYPE};
