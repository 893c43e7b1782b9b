//! Warmup profile management on behalf of a user

use crate::engine::Stores;
use chrono::NaiveTime;
use mailwarm_common::types::{MailAccountId, ProfileId, UserId};
use mailwarm_common::{Error, Result};
use mailwarm_storage::models::{
    CreateWarmupProfile, MailAccount, UpdateWarmupProfile, WarmupProfile,
};
use tracing::info;

/// Profile CRUD with ownership and range checks
pub struct ProfileService {
    stores: Stores,
}

impl ProfileService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// The account's profile, if it has one
    pub async fn get_for_account(
        &self,
        user_id: UserId,
        account_id: MailAccountId,
    ) -> Result<Option<WarmupProfile>> {
        self.owned_account(user_id, account_id).await?;
        self.stores.profiles.get_by_account(account_id).await
    }

    pub async fn create(&self, user_id: UserId, input: CreateWarmupProfile) -> Result<WarmupProfile> {
        self.owned_account(user_id, input.mail_account_id).await?;
        validate(
            input.daily_min_emails,
            input.daily_max_emails,
            input.reply_rate,
            input.max_duration_days,
            input.time_window_start,
            input.time_window_end,
        )?;

        if self
            .stores
            .profiles
            .get_by_account(input.mail_account_id)
            .await?
            .is_some()
        {
            return Err(Error::Validation(
                "Mail account already has a warmup profile".to_string(),
            ));
        }

        let profile = self.stores.profiles.create(input).await?;
        info!(
            profile_id = %profile.id,
            account_id = %profile.mail_account_id,
            "Created warmup profile"
        );
        Ok(profile)
    }

    pub async fn update(
        &self,
        user_id: UserId,
        id: ProfileId,
        input: UpdateWarmupProfile,
    ) -> Result<WarmupProfile> {
        let mut profile = self
            .stores
            .profiles
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound("Warmup profile not found".to_string()))?;
        self.owned_account(user_id, profile.mail_account_id).await?;

        input.apply(&mut profile);
        validate(
            profile.daily_min_emails,
            profile.daily_max_emails,
            profile.reply_rate,
            profile.max_duration_days,
            profile.time_window_start,
            profile.time_window_end,
        )?;

        self.stores.profiles.update(&profile).await?;
        Ok(profile)
    }

    /// Deleting a missing profile is not an error
    pub async fn delete(&self, user_id: UserId, id: ProfileId) -> Result<()> {
        let Some(profile) = self.stores.profiles.get(id).await? else {
            return Ok(());
        };
        self.owned_account(user_id, profile.mail_account_id).await?;

        self.stores.profiles.delete(id).await?;
        info!(profile_id = %id, "Deleted warmup profile");
        Ok(())
    }

    async fn owned_account(&self, user_id: UserId, account_id: MailAccountId) -> Result<MailAccount> {
        match self.stores.accounts.get(account_id).await? {
            Some(account) if account.user_id == user_id => Ok(account),
            _ => Err(Error::NotFound("Mail account not found".to_string())),
        }
    }
}

fn validate(
    daily_min: i32,
    daily_max: i32,
    reply_rate: f64,
    max_duration_days: i32,
    window_start: NaiveTime,
    window_end: NaiveTime,
) -> Result<()> {
    if daily_min < 0 || daily_min > daily_max {
        return Err(Error::Validation(format!(
            "Daily email range {}..{} is invalid",
            daily_min, daily_max
        )));
    }
    if !(0.0..=1.0).contains(&reply_rate) {
        return Err(Error::Validation(format!(
            "Reply rate {} must be between 0 and 1",
            reply_rate
        )));
    }
    if max_duration_days < 0 {
        return Err(Error::Validation(
            "Max duration days cannot be negative".to_string(),
        ));
    }
    if window_start >= window_end {
        return Err(Error::Validation(
            "Time window start must be before its end".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::account;
    use chrono::NaiveDate;
    use mailwarm_storage::MemoryStore;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use uuid::Uuid;

    fn request(account_id: MailAccountId) -> CreateWarmupProfile {
        CreateWarmupProfile {
            mail_account_id: account_id,
            is_enabled: true,
            start_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            daily_min_emails: 2,
            daily_max_emails: 10,
            reply_rate: 0.3,
            max_duration_days: 30,
            time_window_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            time_window_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            randomize: true,
        }
    }

    async fn setup() -> (ProfileService, MailAccount) {
        let store = Arc::new(MemoryStore::new());
        let owned = account("a@example.com");
        store.insert_account(owned.clone()).await;
        (ProfileService::new(Stores::memory(store)), owned)
    }

    #[tokio::test]
    async fn test_create_and_update() {
        let (service, account) = setup().await;

        let profile = service
            .create(account.user_id, request(account.id))
            .await
            .unwrap();
        assert_eq!(profile.current_day, 0);

        let updated = service
            .update(
                account.user_id,
                profile.id,
                UpdateWarmupProfile {
                    daily_max_emails: Some(20),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.daily_max_emails, 20);
        assert_eq!(updated.daily_min_emails, 2);

        let stored = service
            .get_for_account(account.user_id, account.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.daily_max_emails, 20);
    }

    #[tokio::test]
    async fn test_validation() {
        let (service, account) = setup().await;

        let mut inverted = request(account.id);
        inverted.daily_min_emails = 11;
        let mut rate = request(account.id);
        rate.reply_rate = 1.5;
        let mut duration = request(account.id);
        duration.max_duration_days = -1;
        let mut window = request(account.id);
        window.time_window_end = window.time_window_start;

        for input in [inverted, rate, duration, window] {
            let err = service.create(account.user_id, input).await.unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{err}");
        }

        service
            .create(account.user_id, request(account.id))
            .await
            .unwrap();
        let duplicate = service.create(account.user_id, request(account.id)).await;
        assert!(matches!(duplicate, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_rejects_invalid_result() {
        let (service, account) = setup().await;
        let profile = service
            .create(account.user_id, request(account.id))
            .await
            .unwrap();

        let result = service
            .update(
                account.user_id,
                profile.id,
                UpdateWarmupProfile {
                    daily_max_emails: Some(1),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_other_users_are_rejected() {
        let (service, account) = setup().await;
        let stranger = Uuid::now_v7();

        let err = service
            .create(stranger, request(account.id))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let profile = service
            .create(account.user_id, request(account.id))
            .await
            .unwrap();
        assert!(service.delete(stranger, profile.id).await.is_err());
        assert!(service
            .get_for_account(stranger, account.id)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_delete_missing_profile_is_ok() {
        let (service, account) = setup().await;
        service
            .delete(account.user_id, Uuid::now_v7())
            .await
            .unwrap();

        let profile = service
            .create(account.user_id, request(account.id))
            .await
            .unwrap();
        service.delete(account.user_id, profile.id).await.unwrap();
        assert_eq!(
            service
                .get_for_account(account.user_id, account.id)
                .await
                .unwrap(),
            None
        );
    }
}
