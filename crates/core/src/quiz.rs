use std::collections::{BTreeSet, HashSet};
use std::fmt;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::model::{CategoryProgress, Choice, ChoiceId, ExamAnswer, Question};

/// Whether answers are revealed per question (practice) or held until the end (exam).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuizMode {
    Practice,
    Exam,
}

//
// ─── QUIZ STATE ────────────────────────────────────────────────────────────────
//

/// Client-side state of one practice or exam session, independent of rendering.
///
/// The question order is fixed by `initialize_questions`; choices are
/// re-permuted every time a question becomes current. Every index is answered
/// at most once, so `answered_count() <= len()` always holds.
pub struct QuizState {
    questions: Vec<Question>,
    shuffled_questions: Vec<Question>,
    shuffled_choices: Vec<Choice>,
    current_question_index: usize,
    selected: Vec<ChoiceId>,
    show_answer: bool,
    correct_count: u32,
    answered_count: u32,
    answered_questions: BTreeSet<usize>,
    flagged_questions: BTreeSet<usize>,
    shuffle_choices: bool,
    rng: StdRng,
}

impl QuizState {
    /// Creates a session over `questions` in their given order.
    ///
    /// Call `initialize_questions` to pick the session order.
    #[must_use]
    pub fn new(questions: Vec<Question>) -> Self {
        Self::with_rng(questions, StdRng::from_rng(&mut rand::rng()))
    }

    /// Same as `new`, with a seeded generator for reproducible shuffles.
    #[must_use]
    pub fn with_seed(questions: Vec<Question>, seed: u64) -> Self {
        Self::with_rng(questions, StdRng::seed_from_u64(seed))
    }

    fn with_rng(questions: Vec<Question>, rng: StdRng) -> Self {
        let mut state = Self {
            shuffled_questions: questions.clone(),
            questions,
            shuffled_choices: Vec::new(),
            current_question_index: 0,
            selected: Vec::new(),
            show_answer: false,
            correct_count: 0,
            answered_count: 0,
            answered_questions: BTreeSet::new(),
            flagged_questions: BTreeSet::new(),
            shuffle_choices: true,
            rng,
        };
        state.prepare_current_choices();
        state
    }

    /// Enable or disable choice permutation when a question becomes current.
    #[must_use]
    pub fn with_choice_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle_choices = shuffle;
        self.prepare_current_choices();
        self
    }

    /// Fixes the session order, optionally as a random permutation.
    pub fn initialize_questions(&mut self, shuffle: bool) {
        self.shuffled_questions = self.questions.clone();
        if shuffle {
            self.shuffled_questions.shuffle(&mut self.rng);
        }
        self.current_question_index = 0;
        self.clear_question_state();
    }

    /// Re-permutes the choices of the current question.
    pub fn shuffle_current_choices(&mut self) {
        if let Some(question) = self.shuffled_questions.get(self.current_question_index) {
            self.shuffled_choices = question.choices().to_vec();
            self.shuffled_choices.shuffle(&mut self.rng);
        }
    }

    fn prepare_current_choices(&mut self) {
        if self.shuffle_choices {
            self.shuffle_current_choices();
        } else if let Some(question) = self.shuffled_questions.get(self.current_question_index) {
            self.shuffled_choices = question.choices().to_vec();
        } else {
            self.shuffled_choices.clear();
        }
    }

    fn clear_question_state(&mut self) {
        self.selected.clear();
        self.show_answer = false;
        self.prepare_current_choices();
    }

    // ─── Accessors ─────────────────────────────────────────────────────────────

    #[must_use]
    pub fn len(&self) -> usize {
        self.shuffled_questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shuffled_questions.is_empty()
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.shuffled_questions.get(self.current_question_index)
    }

    #[must_use]
    pub fn current_question_index(&self) -> usize {
        self.current_question_index
    }

    #[must_use]
    pub fn shuffled_questions(&self) -> &[Question] {
        &self.shuffled_questions
    }

    #[must_use]
    pub fn shuffled_choices(&self) -> &[Choice] {
        &self.shuffled_choices
    }

    /// Selected choice ids in the order they were picked.
    #[must_use]
    pub fn selected(&self) -> &[ChoiceId] {
        &self.selected
    }

    #[must_use]
    pub fn show_answer(&self) -> bool {
        self.show_answer
    }

    #[must_use]
    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    #[must_use]
    pub fn answered_count(&self) -> u32 {
        self.answered_count
    }

    /// Indices answered so far, in ascending order.
    #[must_use]
    pub fn answered_questions(&self) -> &BTreeSet<usize> {
        &self.answered_questions
    }

    #[must_use]
    pub fn is_answered(&self, index: usize) -> bool {
        self.answered_questions.contains(&index)
    }

    /// Indices not answered yet, for exam review before completion.
    #[must_use]
    pub fn unanswered_indices(&self) -> Vec<usize> {
        (0..self.len())
            .filter(|idx| !self.answered_questions.contains(idx))
            .collect()
    }

    // ─── Selection & scoring ──────────────────────────────────────────────────

    /// Adds or removes a choice from the selection. Ignored once the answer is shown.
    pub fn toggle_choice(&mut self, choice_id: ChoiceId) {
        if self.show_answer {
            return;
        }
        if let Some(pos) = self.selected.iter().position(|id| *id == choice_id) {
            self.selected.remove(pos);
        } else {
            self.selected.push(choice_id);
        }
    }

    #[must_use]
    pub fn is_choice_correct(&self, choice_id: ChoiceId) -> bool {
        self.current_question()
            .is_some_and(|q| q.is_choice_correct(choice_id))
    }

    /// True iff the selection equals the set of correct choices exactly.
    #[must_use]
    pub fn is_current_answer_correct(&self) -> bool {
        let selected: HashSet<ChoiceId> = self.selected.iter().copied().collect();
        match self.current_question() {
            Some(question) => question.is_answered_correctly(&selected),
            None => selected.is_empty(),
        }
    }

    /// Letters of the correct choices, positioned by the shuffled order, joined by " and ".
    ///
    /// `letters` is the label sequence shown next to choices (`A`, `B`, ...).
    #[must_use]
    pub fn correct_letters_display(&self, letters: &[&str]) -> String {
        let Some(question) = self.current_question() else {
            return String::new();
        };
        question
            .choices()
            .iter()
            .filter(|c| c.is_correct)
            .filter_map(|correct| {
                self.shuffled_choices
                    .iter()
                    .position(|c| c.id == correct.id)
                    .and_then(|idx| letters.get(idx))
            })
            .copied()
            .collect::<Vec<_>>()
            .join(" and ")
    }

    /// Records the current selection as the answer to the current question.
    ///
    /// Returns `false` without touching any counter when nothing is selected or
    /// the current question was already answered. In practice mode the answer is
    /// revealed; in exam mode it stays hidden. Scoring is identical in both.
    pub fn submit_answer(&mut self, mode: QuizMode) -> bool {
        if self.selected.is_empty() || self.current_question().is_none() {
            return false;
        }
        if !self.answered_questions.insert(self.current_question_index) {
            return false;
        }

        if mode == QuizMode::Practice {
            self.show_answer = true;
        }
        self.answered_count += 1;
        if self.is_current_answer_correct() {
            self.correct_count += 1;
        }
        true
    }

    /// Rounded percentage of correct answers over all questions; 0 for an empty session.
    #[must_use]
    pub fn score_percentage(&self) -> u32 {
        if self.shuffled_questions.is_empty() {
            return 0;
        }
        let ratio = f64::from(self.correct_count) / self.shuffled_questions.len() as f64;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let pct = (ratio * 100.0).round() as u32;
        pct
    }

    // ─── Navigation ────────────────────────────────────────────────────────────

    /// Moves to the next question. Returns `false` and stays put on the last one.
    pub fn next_question(&mut self) -> bool {
        if self.current_question_index + 1 < self.shuffled_questions.len() {
            self.current_question_index += 1;
            self.clear_question_state();
            true
        } else {
            false
        }
    }

    /// Jumps to `index`, clearing the selection. Out-of-range indices are ignored.
    pub fn go_to_question(&mut self, index: usize) -> bool {
        if index < self.shuffled_questions.len() {
            self.current_question_index = index;
            self.clear_question_state();
            true
        } else {
            false
        }
    }

    /// Flags or unflags the current question for later review.
    pub fn toggle_flag(&mut self) -> bool {
        let idx = self.current_question_index;
        if self.flagged_questions.remove(&idx) {
            false
        } else {
            self.flagged_questions.insert(idx)
        }
    }

    #[must_use]
    pub fn is_flagged(&self, index: usize) -> bool {
        self.flagged_questions.contains(&index)
    }

    #[must_use]
    pub fn flagged_questions(&self) -> &BTreeSet<usize> {
        &self.flagged_questions
    }

    /// Returns counters and position to their initial values. The order is kept.
    pub fn reset(&mut self) {
        self.current_question_index = 0;
        self.correct_count = 0;
        self.answered_count = 0;
        self.answered_questions.clear();
        self.flagged_questions.clear();
        self.clear_question_state();
    }

    // ─── Payloads ──────────────────────────────────────────────────────────────

    /// Progress snapshot for category sync.
    #[must_use]
    pub fn category_progress(&self, time_spent_seconds: u64) -> CategoryProgress {
        CategoryProgress {
            current_question_index: self.current_question_index,
            correct_count: self.correct_count,
            answered_count: self.answered_count,
            time_spent_seconds,
            completed: !self.is_empty()
                && self.answered_questions.len() == self.shuffled_questions.len(),
        }
    }

    /// Answer payload for the current question, or `None` without a question.
    #[must_use]
    pub fn exam_answer(&self, time_spent_seconds: u64) -> Option<ExamAnswer> {
        self.current_question().map(|question| ExamAnswer {
            question_id: question.id(),
            selected_choice_ids: self.selected.clone(),
            time_spent_seconds,
            is_flagged: self.is_flagged(self.current_question_index),
        })
    }
}

impl fmt::Debug for QuizState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuizState")
            .field("questions_len", &self.shuffled_questions.len())
            .field("current_question_index", &self.current_question_index)
            .field("selected", &self.selected)
            .field("show_answer", &self.show_answer)
            .field("correct_count", &self.correct_count)
            .field("answered_count", &self.answered_count)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
