// End-to-end flows through the services, with client-side encryption and an
// in-process key-derivation service.

use candid::Principal;
use futures::executor::block_on;
use keepsake_backend::adapter::local_kds::LocalKeyService;
use keepsake_backend::crypto::envelope::{self, RootKey};
use keepsake_backend::crypto::key_derivation::{DerivationContext, KeyDerivationClient};
use keepsake_backend::error::VaultError;
use keepsake_backend::models::common::{
    EncryptedBlob, PolicyId, SecretCategory, SecretFields, SecretId, Timestamp, NANOS_PER_DAY,
};
use keepsake_backend::models::condition::{ConditionArgs, LogicalOperator, Vote};
use keepsake_backend::services::key_service::GatedTransport;
use keepsake_backend::services::policy_service::{
    self, AddPolicyRequest, ConditionSet, PolicySecretEntry, UpdatePolicyRequest,
};
use keepsake_backend::services::scheduler::run_condition_sweep;
use keepsake_backend::services::secret_service::{self, AddSecretRequest, UpdateSecretRequest};
use keepsake_backend::services::user_service;
use keepsake_backend::storage;
use keepsake_backend::utils::rng::seed_internal_rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::cell::RefCell;

const OWNER: u8 = 1;
const BENEFICIARY: u8 = 2;
const STRANGER: u8 = 3;

fn principal(n: u8) -> Principal {
    Principal::from_slice(&[n; 29])
}

struct Harness {
    kds: LocalKeyService,
    rng: RefCell<ChaCha20Rng>,
}

impl Harness {
    fn new() -> Self {
        seed_internal_rng([21u8; 32]);
        Self {
            kds: LocalKeyService::from_seed([22u8; 32]).unwrap(),
            rng: RefCell::new(ChaCha20Rng::from_seed([23u8; 32])),
        }
    }

    fn root_key(&self, caller: Principal, context: DerivationContext, now: Timestamp) -> Result<RootKey, VaultError> {
        let client = KeyDerivationClient::new(GatedTransport::new(&self.kds, caller, now), 3);
        block_on(client.derive_root_key(&context, &mut *self.rng.borrow_mut()))
    }

    fn fields(password: &str) -> SecretFields<String> {
        SecretFields {
            name: Some("bank".to_string()),
            password: Some(password.to_string()),
            ..Default::default()
        }
    }

    /// Owner stores a secret, creates a policy and files the secret into it.
    fn setup(&self, conditions: ConditionSet, now: Timestamp) -> (SecretId, PolicyId) {
        let owner = principal(OWNER);
        user_service::register_user(owner, 0).unwrap();

        let owner_key = self.root_key(owner, DerivationContext::User(owner), now).unwrap();
        let (ciphertexts, wrapped) =
            envelope::encrypt_new(&Self::fields("p1"), &owner_key, &mut *self.rng.borrow_mut()).unwrap();
        let secret = secret_service::add_secret(
            owner,
            AddSecretRequest {
                category: SecretCategory::Password,
                fields: ciphertexts,
                encrypted_symmetric_key: wrapped.clone(),
            },
            now,
        )
        .unwrap();

        let policy = policy_service::add_policy(owner, AddPolicyRequest::default(), now).unwrap();
        let policy_key = self.root_key(owner, DerivationContext::Policy(policy.id), now).unwrap();
        let policy_wrapped =
            envelope::rewrap(&wrapped, &owner_key, &policy_key, &mut *self.rng.borrow_mut()).unwrap();

        policy_service::update_policy(
            owner,
            UpdatePolicyRequest {
                id: policy.id,
                name: Some("estate".to_string()),
                beneficiaries: Some(vec![principal(BENEFICIARY)]),
                secrets: Some(vec![PolicySecretEntry {
                    secret_id: secret.id,
                    encrypted_symmetric_key: Some(policy_wrapped),
                }]),
                conditions: Some(conditions),
            },
            now,
        )
        .unwrap();
        (secret.id, policy.id)
    }

    /// A beneficiary's full read: gated secret fetch, policy root key, decrypt.
    fn read_as(&self, caller: Principal, secret: SecretId, policy: PolicyId, now: Timestamp) -> Result<String, VaultError> {
        let disclosed = secret_service::get_secret_as_beneficiary(caller, secret, policy, now)?;
        let policy_key = self.root_key(caller, DerivationContext::Policy(policy), now)?;
        let plain = envelope::decrypt(&disclosed.secret.fields, &disclosed.encrypted_symmetric_key, &policy_key)?;
        Ok(plain.password.unwrap_or_default())
    }
}

fn fixed(datetime: Timestamp) -> ConditionSet {
    ConditionSet {
        conditions: vec![ConditionArgs::FixedDateTime { datetime }],
        logical_operator: None,
    }
}

#[test]
fn past_fixed_date_discloses_immediately() {
    let h = Harness::new();
    let now = 10 * NANOS_PER_DAY;
    let (secret, policy) = h.setup(fixed(NANOS_PER_DAY), now);

    assert_eq!(h.read_as(principal(BENEFICIARY), secret, policy, now).unwrap(), "p1");
}

#[test]
fn future_fixed_date_discloses_after_instant() {
    let h = Harness::new();
    let now = NANOS_PER_DAY;
    let due = 5 * NANOS_PER_DAY;
    let (secret, policy) = h.setup(fixed(due), now);

    let beneficiary_err = h.read_as(principal(BENEFICIARY), secret, policy, now).unwrap_err();
    let stranger_err = h.read_as(principal(STRANGER), secret, policy, now).unwrap_err();
    assert_eq!(beneficiary_err, VaultError::CallerNotBeneficiary);
    assert_eq!(beneficiary_err, stranger_err);
    assert_eq!(
        h.root_key(principal(BENEFICIARY), DerivationContext::Policy(policy), now).unwrap_err(),
        VaultError::KeyGenerationNotAllowed
    );

    let report = run_condition_sweep(principal(200), due).unwrap();
    assert_eq!(report.newly_disclosed, 1);
    assert_eq!(h.read_as(principal(BENEFICIARY), secret, policy, due).unwrap(), "p1");
    assert_eq!(
        h.read_as(principal(STRANGER), secret, policy, due).unwrap_err(),
        VaultError::CallerNotBeneficiary
    );
}

#[test]
fn quorum_two_of_three_locks_once_reached() {
    let h = Harness::new();
    let validators = vec![principal(10), principal(11), principal(12)];
    let (secret, policy) = h.setup(
        ConditionSet {
            conditions: vec![ConditionArgs::XOutOfY {
                quorum: 2,
                validators: validators.clone(),
            }],
            logical_operator: None,
        },
        1,
    );

    let after_one = policy_service::confirm_x_out_of_y_condition(validators[0], policy, Vote::Confirmed, 2).unwrap();
    assert!(!after_one.conditions_status);
    assert!(h.read_as(principal(BENEFICIARY), secret, policy, 2).is_err());

    let after_two = policy_service::confirm_x_out_of_y_condition(validators[1], policy, Vote::Confirmed, 3).unwrap();
    assert!(after_two.conditions_status);

    let after_decline = policy_service::confirm_x_out_of_y_condition(validators[0], policy, Vote::Declined, 4).unwrap();
    assert!(after_decline.conditions_status);
    assert_eq!(h.read_as(principal(BENEFICIARY), secret, policy, 5).unwrap(), "p1");

    // Owner and beneficiary cannot vote.
    assert!(policy_service::confirm_x_out_of_y_condition(principal(OWNER), policy, Vote::Confirmed, 6).is_err());
    assert!(policy_service::confirm_x_out_of_y_condition(principal(BENEFICIARY), policy, Vote::Confirmed, 6).is_err());
    assert_eq!(storage::get_metrics().votes_cast, 3);
}

#[test]
fn and_or_aggregation_over_mixed_conditions() {
    let h = Harness::new();
    let conditions = |operator| ConditionSet {
        conditions: vec![
            ConditionArgs::FixedDateTime { datetime: 0 },
            ConditionArgs::FixedDateTime { datetime: u64::MAX },
        ],
        logical_operator: Some(operator),
    };
    let (secret, policy) = h.setup(conditions(LogicalOperator::And), 1);
    assert!(h.read_as(principal(BENEFICIARY), secret, policy, 2).is_err());

    let updated = policy_service::update_policy(
        principal(OWNER),
        UpdatePolicyRequest {
            id: policy,
            name: None,
            beneficiaries: None,
            secrets: None,
            conditions: Some(conditions(LogicalOperator::Or)),
        },
        3,
    )
    .unwrap();
    assert!(updated.conditions_status);
    assert_eq!(h.read_as(principal(BENEFICIARY), secret, policy, 4).unwrap(), "p1");
}

#[test]
fn last_login_resets_until_owner_goes_quiet() {
    let h = Harness::new();
    let (secret, policy) = h.setup(
        ConditionSet {
            conditions: vec![ConditionArgs::LastLogin {
                number_of_days_since_last_login: 30,
            }],
            logical_operator: None,
        },
        1,
    );

    user_service::register_user(principal(OWNER), 20 * NANOS_PER_DAY).unwrap();
    assert!(h.read_as(principal(BENEFICIARY), secret, policy, 45 * NANOS_PER_DAY).is_err());
    assert_eq!(
        h.read_as(principal(BENEFICIARY), secret, policy, 50 * NANOS_PER_DAY).unwrap(),
        "p1"
    );

    // Satisfied stays satisfied when the owner returns.
    user_service::register_user(principal(OWNER), 51 * NANOS_PER_DAY).unwrap();
    assert_eq!(
        h.read_as(principal(BENEFICIARY), secret, policy, 52 * NANOS_PER_DAY).unwrap(),
        "p1"
    );
}

#[test]
fn owner_update_keeps_policy_copy_readable() {
    let h = Harness::new();
    let owner = principal(OWNER);
    let (secret_id, policy) = h.setup(fixed(0), 1);

    let owner_key = h.root_key(owner, DerivationContext::User(owner), 2).unwrap();
    let stored = secret_service::get_secret(owner, secret_id).unwrap();
    let wrapped = secret_service::get_secret_symmetric_key(owner, secret_id).unwrap();
    let mut plain = envelope::decrypt(&stored.fields, &wrapped, &owner_key).unwrap();
    plain.notes = Some("security question: blue".to_string());

    let fields = envelope::encrypt_update(&plain, &owner_key, &wrapped, &stored.fields, &mut *h.rng.borrow_mut()).unwrap();
    assert_eq!(fields.password, stored.fields.password);
    secret_service::update_secret(
        owner,
        UpdateSecretRequest {
            id: secret_id,
            category: SecretCategory::Password,
            fields,
        },
        3,
    )
    .unwrap();

    let disclosed = secret_service::get_secret_as_beneficiary(principal(BENEFICIARY), secret_id, policy, 4).unwrap();
    let policy_key = h.root_key(principal(BENEFICIARY), DerivationContext::Policy(policy), 4).unwrap();
    let via_policy = envelope::decrypt(&disclosed.secret.fields, &disclosed.encrypted_symmetric_key, &policy_key).unwrap();
    assert_eq!(via_policy, plain);
}

#[test]
fn removing_secret_cascades_into_policies() {
    let h = Harness::new();
    let (secret, policy) = h.setup(fixed(0), 1);

    secret_service::remove_secret(principal(OWNER), secret, 2).unwrap();

    let stored = policy_service::get_policy_as_owner(principal(OWNER), policy).unwrap();
    assert!(stored.secrets.is_empty());
    assert!(stored.key_box.is_empty());
    assert!(matches!(
        h.read_as(principal(BENEFICIARY), secret, policy, 3),
        Err(VaultError::SecretNotFound(_))
    ));
    assert!(user_service::get_user(principal(OWNER)).unwrap().key_box.is_empty());
}

#[test]
fn user_with_policies_cannot_be_deleted() {
    let h = Harness::new();
    let (_, policy) = h.setup(fixed(0), 1);

    assert!(matches!(
        user_service::delete_user(principal(OWNER)),
        Err(VaultError::UserHasPolicies(_))
    ));
    policy_service::remove_policy(principal(OWNER), policy, 2).unwrap();
    user_service::delete_user(principal(OWNER)).unwrap();
    assert!(user_service::get_user(principal(OWNER)).is_err());
    assert_eq!(storage::get_metrics().total_secrets, 0);
}

#[test]
fn participants_see_their_listings() {
    let h = Harness::new();
    let (_, policy) = h.setup(
        ConditionSet {
            conditions: vec![
                ConditionArgs::FixedDateTime { datetime: u64::MAX },
                ConditionArgs::XOutOfY {
                    quorum: 1,
                    validators: vec![principal(10)],
                },
            ],
            logical_operator: Some(LogicalOperator::And),
        },
        1,
    );

    let as_beneficiary = policy_service::get_policy_list_as_beneficiary(principal(BENEFICIARY));
    assert_eq!(as_beneficiary.len(), 1);
    assert!(!as_beneficiary[0].conditions_status);
    assert!(matches!(
        policy_service::get_policy_as_beneficiary(principal(BENEFICIARY), policy, 2),
        Err(VaultError::InvalidPolicyCondition(_))
    ));

    let as_validator = policy_service::get_policy_list_as_validator(principal(10));
    assert_eq!(as_validator.len(), 1);
    assert_eq!(as_validator[0].conditions.len(), 1);
    assert_eq!(
        policy_service::get_policy_as_validator(principal(10), policy).unwrap().conditions.len(),
        2
    );
    assert!(matches!(
        policy_service::get_policy_as_validator(principal(STRANGER), policy),
        Err(VaultError::PolicyNotFound(_))
    ));
    assert!(policy_service::get_policy_list_as_validator(principal(STRANGER)).is_empty());
}

#[test]
fn tampered_policy_key_fails_opaquely() {
    let h = Harness::new();
    let (secret, policy) = h.setup(fixed(0), 1);

    let disclosed = secret_service::get_secret_as_beneficiary(principal(BENEFICIARY), secret, policy, 2).unwrap();
    let mut tampered = disclosed.encrypted_symmetric_key.0.clone();
    tampered[20] ^= 1;
    let policy_key = h.root_key(principal(BENEFICIARY), DerivationContext::Policy(policy), 2).unwrap();
    assert_eq!(
        envelope::decrypt(&disclosed.secret.fields, &EncryptedBlob(tampered), &policy_key).unwrap_err(),
        VaultError::DecryptionFailed
    );

    // The owner's own key does not open the policy copy either.
    let owner_key = h.root_key(principal(OWNER), DerivationContext::User(principal(OWNER)), 2).unwrap();
    assert_eq!(
        envelope::decrypt(&disclosed.secret.fields, &disclosed.encrypted_symmetric_key, &owner_key).unwrap_err(),
        VaultError::DecryptionFailed
    );
}
