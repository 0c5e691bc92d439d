//! Mock meeting directory for testing.
//!
//! Responses are scripted per operation and consumed in order; once a
//! script runs dry the last configured default is returned.

use super::*;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Scripted directory with per-operation call counters.
pub struct MockDirectory {
    validations: Mutex<VecDeque<Result<MeetingValidation, DirectoryError>>>,
    default_validation: Result<MeetingValidation, DirectoryError>,
    slot_results: Mutex<VecDeque<Result<(), DirectoryError>>>,
    create_result: Result<CreatedMeetingRecord, DirectoryError>,
    invite_result: Result<(), DirectoryError>,
    create_calls: AtomicUsize,
    validate_calls: AtomicUsize,
    select_slot_calls: AtomicUsize,
    invite_calls: AtomicUsize,
    selected_slots: Mutex<Vec<SlotTime>>,
}

impl MockDirectory {
    /// A directory that reports every meeting valid with no slot and
    /// accepts every slot selection.
    #[must_use]
    pub fn accepting() -> Self {
        Self {
            validations: Mutex::new(VecDeque::new()),
            default_validation: Ok(MeetingValidation::valid(None)),
            slot_results: Mutex::new(VecDeque::new()),
            create_result: Err(DirectoryError::Unavailable(
                "no create response scripted".to_string(),
            )),
            invite_result: Ok(()),
            create_calls: AtomicUsize::new(0),
            validate_calls: AtomicUsize::new(0),
            select_slot_calls: AtomicUsize::new(0),
            invite_calls: AtomicUsize::new(0),
            selected_slots: Mutex::new(Vec::new()),
        }
    }

    /// A directory reporting every meeting invalid with `message`.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::accepting().with_default_validation(Ok(MeetingValidation::invalid(message)))
    }

    /// A directory that is unreachable for every call.
    #[must_use]
    pub fn unreachable() -> Self {
        let err = DirectoryError::Unavailable("connection refused".to_string());
        let mut mock = Self::accepting().with_default_validation(Err(err.clone()));
        mock.slot_results
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(err.clone()));
        mock.create_result = Err(err.clone());
        mock.invite_result = Err(err);
        mock
    }

    /// Validation response returned once the scripted queue is empty.
    #[must_use]
    pub fn with_default_validation(
        mut self,
        result: Result<MeetingValidation, DirectoryError>,
    ) -> Self {
        self.default_validation = result;
        self
    }

    /// Queue validation responses, returned in order.
    #[must_use]
    pub fn with_validations(
        self,
        results: impl IntoIterator<Item = Result<MeetingValidation, DirectoryError>>,
    ) -> Self {
        self.validations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(results);
        self
    }

    /// Queue slot-selection responses. The last queued entry repeats; with
    /// nothing queued every selection succeeds.
    #[must_use]
    pub fn with_slot_results(
        self,
        results: impl IntoIterator<Item = Result<(), DirectoryError>>,
    ) -> Self {
        self.slot_results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(results);
        self
    }

    /// Response for `create_meeting`.
    #[must_use]
    pub fn with_create_result(
        mut self,
        result: Result<CreatedMeetingRecord, DirectoryError>,
    ) -> Self {
        self.create_result = result;
        self
    }

    /// Response for `send_invite`.
    #[must_use]
    pub fn with_invite_result(mut self, result: Result<(), DirectoryError>) -> Self {
        self.invite_result = result;
        self
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn validate_calls(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    pub fn select_slot_calls(&self) -> usize {
        self.select_slot_calls.load(Ordering::SeqCst)
    }

    pub fn invite_calls(&self) -> usize {
        self.invite_calls.load(Ordering::SeqCst)
    }

    /// Slots passed to `select_slot`, in call order.
    pub fn selected_slots(&self) -> Vec<SlotTime> {
        self.selected_slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl MeetingDirectory for MockDirectory {
    async fn create_meeting(
        &self,
        _recipient: &str,
    ) -> Result<CreatedMeetingRecord, DirectoryError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.create_result.clone()
    }

    async fn validate_meeting(
        &self,
        _meeting_id: &MeetingId,
    ) -> Result<MeetingValidation, DirectoryError> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        self.validations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.default_validation.clone())
    }

    async fn select_slot(
        &self,
        _meeting_id: &MeetingId,
        slot: SlotTime,
    ) -> Result<(), DirectoryError> {
        self.select_slot_calls.fetch_add(1, Ordering::SeqCst);
        self.selected_slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(slot);

        let mut queue = self
            .slot_results
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match queue.len() {
            0 => Ok(()),
            1 => queue.front().cloned().unwrap_or(Ok(())),
            _ => queue.pop_front().unwrap_or(Ok(())),
        }
    }

    async fn send_invite(
        &self,
        _meeting_id: &MeetingId,
        _recipient: &str,
    ) -> Result<(), DirectoryError> {
        self.invite_calls.fetch_add(1, Ordering::SeqCst);
        self.invite_result.clone()
    }
}
