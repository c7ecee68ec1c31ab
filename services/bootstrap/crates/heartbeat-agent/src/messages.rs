//! Texts the heartbeat sends to the owner and the administrator.

use plane_common::OnboardingStep;

pub fn welcome(trigger: &str) -> String {
    format!(
        "Hi! I'm your new assistant and my instance just finished booting.\n\n\
         Next we link me to your messaging app. Reply \"{trigger}\" when you have your \
         phone at hand: I'll send a code that is only valid for about a minute."
    )
}

pub fn pairing_caption(validity_secs: u64, trigger: &str) -> String {
    format!(
        "Scan this code now (Settings > Linked devices > Link a device). \
         It expires in about {validity_secs} seconds. If it does, reply \"{trigger}\" \
         again for a fresh one."
    )
}

pub fn greeting() -> &'static str {
    "We're linked. From now on I'll talk to you here. A few quick questions to get set up."
}

pub fn expired(trigger: &str) -> String {
    format!(
        "The linking code expired before it was scanned. \
         Reply \"{trigger}\" whenever you're ready and I'll send a new one."
    )
}

pub fn escalation(owner: &str, expiries: u32) -> String {
    format!(
        "Pairing for {owner} has expired {expiries} times in a row without being scanned. \
         The instance keeps waiting for the owner; you may want to reach out."
    )
}

pub fn prompt(step: OnboardingStep) -> &'static str {
    match step {
        OnboardingStep::Identity => {
            "What should I call you, and what would you like to call me?"
        }
        OnboardingStep::Personality => {
            "How should I come across: brief and direct, or chatty and detailed? \
             Anything I should always or never do?"
        }
        OnboardingStep::CredentialMigration => {
            "Last step: send me your own model provider API key (it starts with \"sk-\"). \
             I'll store it securely and delete your message right away."
        }
        OnboardingStep::Engage => engagement(),
    }
}

pub fn credential_rejected() -> &'static str {
    "That doesn't look like an API key. Please send just the key, starting with \"sk-\"."
}

pub fn engagement() -> &'static str {
    "All set. I'll check in when something needs your attention, \
     and you can message me here any time."
}
