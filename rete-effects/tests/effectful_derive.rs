use rete_effects::{Effect, Effectful};
use rete_effects_derive::Effectful;

#[derive(Effectful)]
#[effect(Pure)]
struct LogMessage;

#[derive(Effectful)]
#[effect(Observe)]
struct ReadFieldValue;

#[derive(Effectful)]
#[effect(Mutate)]
struct EmitDerivedFact;

#[derive(Effectful)]
#[effect(Irreversible)]
struct SendExternalWebhook;

#[test]
fn derive_supports_all_effect_variants() {
    assert_eq!(LogMessage.effect(), Effect::Pure);
    assert_eq!(ReadFieldValue.effect(), Effect::Observe);
    assert_eq!(EmitDerivedFact.effect(), Effect::Mutate);
    assert_eq!(SendExternalWebhook.effect(), Effect::Irreversible);
}
