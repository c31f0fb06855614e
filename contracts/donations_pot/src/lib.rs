#![no_std]

use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, symbol_short, token, Address, Env, String,
};

#[contract]
pub struct DonationsPot;

/// A donor's share of the pot. Created on first registered donation, never
/// deleted; the balance only rises through registration and only falls when
/// the donor (or the manager, after the silence window) directs it onward.
#[derive(Clone, Debug, Eq, PartialEq)]
#[contracttype]
pub struct Donor {
    /// Display name supplied with the first registered donation.
    pub name: String,
    pub balance: i128,
    pub donation_count: u32,
    /// Last time the donor registered or transferred. The forgotten-donation
    /// window is measured from here.
    pub last_active: u64,
}

/// A registered destination for donations. Write-once apart from bookkeeping.
#[derive(Clone, Debug, Eq, PartialEq)]
#[contracttype]
pub struct Recipient {
    pub name: String,
    /// Cumulative amount received through transfers and sweeps.
    pub balance: i128,
    pub donation_count: u32,
}

/// Pot-wide counters.
#[derive(Clone, Debug, Eq, PartialEq)]
#[contracttype]
pub struct Stats {
    pub donations_count: u64,
    pub donations_amount: i128,
    pub transfers_count: u64,
    pub transfers_amount: i128,
}

#[derive(Clone)]
#[contracttype]
enum DataKey {
    /// Runs the recipient registry, sweeps and surplus recovery.
    Manager,
    /// Records donations already deposited into custody.
    Distributor,
    /// Token the pot holds donations in; custody is measured in this token.
    Token,
    /// Seconds of donor silence before the manager may sweep a balance.
    DonationTimeout,
    /// Sum of all donor balances. Custody minus this is unregistered surplus.
    RegisteredBalance,
    Stats,
    Donor(Address),
    Recipient(Address),
    DefaultRecipient,
}

#[contracterror]
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[repr(u32)]
pub enum Error {
    NotInitialized = 1,
    AlreadyInitialized = 2,
    Unauthorized = 3,
    InvalidAmount = 4,
    /// Custody holds less unregistered value than the amount being recorded.
    InsufficientFunding = 5,
    InsufficientBalance = 6,
    NotRegistered = 7,
    AlreadyRegistered = 8,
    EmptyName = 9,
    /// The donor's silence window has not elapsed yet.
    TooEarly = 10,
    AllowanceExceeded = 11,
    ExternalTransferFailed = 12,
    MathOverflow = 13,
}

fn read_manager(env: &Env) -> Result<Address, Error> {
    env.storage()
        .instance()
        .get(&DataKey::Manager)
        .ok_or(Error::NotInitialized)
}

fn require_manager_auth(env: &Env) -> Result<(), Error> {
    let manager = read_manager(env)?;
    manager.require_auth();
    Ok(())
}

fn read_distributor(env: &Env) -> Result<Address, Error> {
    env.storage()
        .instance()
        .get(&DataKey::Distributor)
        .ok_or(Error::NotInitialized)
}

fn require_distributor_auth(env: &Env) -> Result<(), Error> {
    let distributor = read_distributor(env)?;
    distributor.require_auth();
    Ok(())
}

fn read_token(env: &Env) -> Result<Address, Error> {
    env.storage()
        .instance()
        .get(&DataKey::Token)
        .ok_or(Error::NotInitialized)
}

fn read_timeout(env: &Env) -> Result<u64, Error> {
    env.storage()
        .instance()
        .get(&DataKey::DonationTimeout)
        .ok_or(Error::NotInitialized)
}

fn read_registered_balance(env: &Env) -> i128 {
    env.storage()
        .instance()
        .get(&DataKey::RegisteredBalance)
        .unwrap_or(0)
}

fn write_registered_balance(env: &Env, balance: i128) {
    env.storage()
        .instance()
        .set(&DataKey::RegisteredBalance, &balance);
}

fn read_stats(env: &Env) -> Stats {
    env.storage().instance().get(&DataKey::Stats).unwrap_or(Stats {
        donations_count: 0,
        donations_amount: 0,
        transfers_count: 0,
        transfers_amount: 0,
    })
}

fn write_stats(env: &Env, stats: &Stats) {
    env.storage().instance().set(&DataKey::Stats, stats);
}

fn read_donor(env: &Env, donor: &Address) -> Option<Donor> {
    env.storage().instance().get(&DataKey::Donor(donor.clone()))
}

fn write_donor(env: &Env, donor: &Address, entry: &Donor) {
    env.storage()
        .instance()
        .set(&DataKey::Donor(donor.clone()), entry);
}

fn read_recipient(env: &Env, recipient: &Address) -> Option<Recipient> {
    env.storage()
        .instance()
        .get(&DataKey::Recipient(recipient.clone()))
}

fn write_recipient(env: &Env, recipient: &Address, entry: &Recipient) {
    env.storage()
        .instance()
        .set(&DataKey::Recipient(recipient.clone()), entry);
}

/// Custody minus the registered balance. Always recomputed from the token
/// ledger so registration preconditions see the current committed state.
fn unregistered_surplus(env: &Env) -> Result<i128, Error> {
    let token = read_token(env)?;
    let client = token::Client::new(env, &token);
    let custody = client.balance(&env.current_contract_address());
    custody
        .checked_sub(read_registered_balance(env))
        .ok_or(Error::MathOverflow)
}

/// Move tokens out of custody. This must succeed before any bookkeeping is
/// written; a failure aborts the whole operation with no local change.
fn payout(env: &Env, to: &Address, amount: i128) -> Result<(), Error> {
    let token = read_token(env)?;
    let client = token::Client::new(env, &token);
    let contract = env.current_contract_address();
    match client.try_transfer(&contract, to, &amount) {
        Ok(Ok(())) => Ok(()),
        _ => Err(Error::ExternalTransferFailed),
    }
}

/// Bookkeeping shared by both registration paths. The custody side is already
/// settled when this runs.
fn credit_donation(env: &Env, donor: &Address, name: &String, amount: i128) -> Result<(), Error> {
    let now = env.ledger().timestamp();
    let mut entry = read_donor(env, donor).unwrap_or(Donor {
        name: name.clone(),
        balance: 0,
        donation_count: 0,
        last_active: now,
    });
    entry.balance = entry.balance.checked_add(amount).ok_or(Error::MathOverflow)?;
    entry.donation_count += 1;
    entry.last_active = now;
    write_donor(env, donor, &entry);

    let registered = read_registered_balance(env)
        .checked_add(amount)
        .ok_or(Error::MathOverflow)?;
    write_registered_balance(env, registered);

    let mut stats = read_stats(env);
    stats.donations_count += 1;
    stats.donations_amount = stats
        .donations_amount
        .checked_add(amount)
        .ok_or(Error::MathOverflow)?;
    write_stats(env, &stats);

    env.events().publish(
        (symbol_short!("donation"), donor.clone()),
        (amount, entry.balance),
    );
    Ok(())
}

/// Pay `amount` out to the recipient, then settle the books on both sides.
/// Used by donor transfers and by the forgotten-donation sweep.
fn apply_transfer(
    env: &Env,
    donor_addr: &Address,
    mut donor: Donor,
    recipient_addr: &Address,
    mut recipient: Recipient,
    amount: i128,
) -> Result<(), Error> {
    payout(env, recipient_addr, amount)?;

    donor.balance = donor.balance.checked_sub(amount).ok_or(Error::MathOverflow)?;
    donor.last_active = env.ledger().timestamp();
    write_donor(env, donor_addr, &donor);

    let registered = read_registered_balance(env)
        .checked_sub(amount)
        .ok_or(Error::MathOverflow)?;
    write_registered_balance(env, registered);

    recipient.balance = recipient
        .balance
        .checked_add(amount)
        .ok_or(Error::MathOverflow)?;
    recipient.donation_count += 1;
    write_recipient(env, recipient_addr, &recipient);

    let mut stats = read_stats(env);
    stats.transfers_count += 1;
    stats.transfers_amount = stats
        .transfers_amount
        .checked_add(amount)
        .ok_or(Error::MathOverflow)?;
    write_stats(env, &stats);
    Ok(())
}

#[contractimpl]
impl DonationsPot {
    /// One-time setup: the two role identities, the custody token and the
    /// forgotten-donation window (seconds of donor silence).
    pub fn initialize(
        env: Env,
        manager: Address,
        distributor: Address,
        token: Address,
        donation_timeout: u64,
    ) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Manager) {
            return Err(Error::AlreadyInitialized);
        }
        manager.require_auth();
        env.storage().instance().set(&DataKey::Manager, &manager);
        env.storage()
            .instance()
            .set(&DataKey::Distributor, &distributor);
        env.storage().instance().set(&DataKey::Token, &token);
        env.storage()
            .instance()
            .set(&DataKey::DonationTimeout, &donation_timeout);
        write_registered_balance(&env, 0);
        write_stats(
            &env,
            &Stats {
                donations_count: 0,
                donations_amount: 0,
                transfers_count: 0,
                transfers_amount: 0,
            },
        );
        Ok(())
    }

    /// Record a donation already deposited into custody. Distributor only:
    /// the tokens must sit in the pot before this merely attributes them.
    pub fn register_donation(
        env: Env,
        donor: Address,
        name: String,
        amount: i128,
    ) -> Result<(), Error> {
        require_distributor_auth(&env)?;
        if amount <= 0 {
            return Err(Error::InvalidAmount);
        }
        if unregistered_surplus(&env)? < amount {
            return Err(Error::InsufficientFunding);
        }
        credit_donation(&env, &donor, &name, amount)
    }

    /// Self-service donation: withdraw `amount` from the donor through a
    /// pre-granted allowance, then attribute it. The withdrawal must land
    /// before any bookkeeping is written.
    pub fn pull_donation(env: Env, donor: Address, name: String, amount: i128) -> Result<(), Error> {
        donor.require_auth();
        if amount <= 0 {
            return Err(Error::InvalidAmount);
        }
        let token = read_token(&env)?;
        let client = token::Client::new(&env, &token);
        let contract = env.current_contract_address();
        if client.allowance(&donor, &contract) < amount {
            return Err(Error::AllowanceExceeded);
        }
        match client.try_transfer_from(&contract, &donor, &contract, &amount) {
            Ok(Ok(())) => (),
            _ => return Err(Error::ExternalTransferFailed),
        }
        credit_donation(&env, &donor, &name, amount)
    }

    /// Register a destination donors can direct their balance to. Write-once.
    pub fn add_recipient(env: Env, recipient: Address, name: String) -> Result<(), Error> {
        require_manager_auth(&env)?;
        if name.len() == 0 {
            return Err(Error::EmptyName);
        }
        if read_recipient(&env, &recipient).is_some() {
            return Err(Error::AlreadyRegistered);
        }
        write_recipient(
            &env,
            &recipient,
            &Recipient {
                name: name.clone(),
                balance: 0,
                donation_count: 0,
            },
        );
        env.events()
            .publish((symbol_short!("recipient"), recipient), name);
        Ok(())
    }

    /// Make `recipient` the default sweep target, replacing any previous one.
    pub fn mark_as_default(env: Env, recipient: Address) -> Result<(), Error> {
        require_manager_auth(&env)?;
        if read_recipient(&env, &recipient).is_none() {
            return Err(Error::NotRegistered);
        }
        env.storage()
            .instance()
            .set(&DataKey::DefaultRecipient, &recipient);
        env.events().publish((symbol_short!("default"),), recipient);
        Ok(())
    }

    /// Send part of the donor's registered balance to a recipient. The donor
    /// address is the acting identity and must authorize the call.
    pub fn transfer_donation(
        env: Env,
        donor: Address,
        recipient: Address,
        amount: i128,
    ) -> Result<(), Error> {
        donor.require_auth();
        let recipient_entry = read_recipient(&env, &recipient).ok_or(Error::NotRegistered)?;
        if amount <= 0 {
            return Err(Error::InvalidAmount);
        }
        // An unknown donor holds nothing, so any positive amount overdraws.
        let donor_entry = read_donor(&env, &donor).ok_or(Error::InsufficientBalance)?;
        if amount > donor_entry.balance {
            return Err(Error::InsufficientBalance);
        }
        apply_transfer(&env, &donor, donor_entry, &recipient, recipient_entry, amount)?;
        env.events()
            .publish((symbol_short!("transfer"), donor, recipient), amount);
        Ok(())
    }

    /// Manager-only fallback for balances the donor never directed: once the
    /// silence window has elapsed, the whole balance moves to `recipient`.
    pub fn distribute_forgotten_donations(
        env: Env,
        donor: Address,
        recipient: Address,
    ) -> Result<(), Error> {
        require_manager_auth(&env)?;
        let donor_entry = read_donor(&env, &donor).ok_or(Error::NotRegistered)?;
        let recipient_entry = read_recipient(&env, &recipient).ok_or(Error::NotRegistered)?;

        let timeout = read_timeout(&env)?;
        let now = env.ledger().timestamp();
        if now.saturating_sub(donor_entry.last_active) < timeout {
            return Err(Error::TooEarly);
        }

        let amount = donor_entry.balance;
        if amount <= 0 {
            return Err(Error::InvalidAmount);
        }
        apply_transfer(&env, &donor, donor_entry, &recipient, recipient_entry, amount)?;
        env.events()
            .publish((symbol_short!("forgotten"), donor, recipient), amount);
        Ok(())
    }

    /// Send custody funds that were never attributed to a donor to `target`.
    /// A pot with no surplus is a no-op returning 0, not an error. Donor and
    /// recipient books are untouched either way.
    pub fn recover_unregistered_funds(env: Env, target: Address) -> Result<i128, Error> {
        require_manager_auth(&env)?;
        let surplus = unregistered_surplus(&env)?;
        if surplus <= 0 {
            return Ok(0);
        }
        payout(&env, &target, surplus)?;
        env.events()
            .publish((symbol_short!("recover"), target), surplus);
        Ok(surplus)
    }

    // Read-only surface.

    pub fn get_registered_balance(env: Env) -> i128 {
        read_registered_balance(&env)
    }

    pub fn get_donor(env: Env, donor: Address) -> Option<Donor> {
        read_donor(&env, &donor)
    }

    pub fn get_donor_balance(env: Env, donor: Address) -> i128 {
        read_donor(&env, &donor).map_or(0, |d| d.balance)
    }

    pub fn get_donor_donations_count(env: Env, donor: Address) -> u32 {
        read_donor(&env, &donor).map_or(0, |d| d.donation_count)
    }

    pub fn get_recipient(env: Env, recipient: Address) -> Option<Recipient> {
        read_recipient(&env, &recipient)
    }

    pub fn get_recipient_balance(env: Env, recipient: Address) -> i128 {
        read_recipient(&env, &recipient).map_or(0, |r| r.balance)
    }

    pub fn get_recipient_donations_count(env: Env, recipient: Address) -> u32 {
        read_recipient(&env, &recipient).map_or(0, |r| r.donation_count)
    }

    pub fn get_default_recipient(env: Env) -> Option<Address> {
        env.storage().instance().get(&DataKey::DefaultRecipient)
    }

    pub fn get_stats(env: Env) -> Stats {
        read_stats(&env)
    }

    pub fn get_donation_timeout(env: Env) -> Result<u64, Error> {
        read_timeout(&env)
    }

    pub fn get_manager(env: Env) -> Result<Address, Error> {
        read_manager(&env)
    }

    pub fn get_distributor(env: Env) -> Result<Address, Error> {
        read_distributor(&env)
    }

    pub fn get_token(env: Env) -> Result<Address, Error> {
        read_token(&env)
    }
}
