use super::*;
use crate::test_support::{add_light, harness, reported};

fn controlled_light(baseline: SmartOffBaseline) -> Light {
    Light {
        id: LightId(1),
        name: "Hall".into(),
        light_type: "Extended color light".into(),
        model_id: "LCT015".into(),
        on: true,
        on_controlled: true,
        on_threshold: 0.0,
        bri_controlled: true,
        bri_max: 254.0,
        ct_controlled: true,
        bri_curve_id: None,
        ct_curve_id: None,
        smart_off: baseline,
    }
}

fn baseline(on: bool, bri: u8, ct: u16) -> SmartOffBaseline {
    SmartOffBaseline {
        on: Some(on),
        bri: Some(bri),
        ct: Some(ct),
        active: false,
    }
}

#[test]
fn diverged_truth_table() {
    let light = controlled_light(baseline(true, 100, 300));

    assert!(!diverged(&light, &reported(true, 100, 300)));
    assert!(diverged(&light, &reported(false, 100, 300)));
    assert!(diverged(&light, &reported(true, 140, 300)));
    assert!(diverged(&light, &reported(true, 100, 370)));
}

#[test]
fn uncontrolled_capabilities_never_diverge() {
    let mut light = controlled_light(baseline(true, 100, 300));
    light.bri_controlled = false;
    light.ct_controlled = false;
    assert!(!diverged(&light, &reported(true, 10, 500)));

    light.on_controlled = false;
    assert!(!diverged(&light, &reported(false, 10, 500)));
}

#[test]
fn missing_baseline_values_never_diverge() {
    let light = controlled_light(SmartOffBaseline::default());
    assert!(!diverged(&light, &reported(false, 1, 153)));

    let light = controlled_light(SmartOffBaseline {
        bri: Some(100),
        ..SmartOffBaseline::default()
    });
    assert!(!diverged(&light, &reported(false, 100, 153)));
    assert!(diverged(&light, &reported(true, 99, 153)));
}

#[test]
fn overrides_are_sticky() {
    let mut light = controlled_light(baseline(true, 100, 300));
    assert!(!is_overridden(&light, &reported(true, 100, 300)));

    light.smart_off.active = true;
    assert!(is_overridden(&light, &reported(true, 100, 300)));
}

#[test]
fn follow_tracks_the_reported_state() {
    let followed = follow(&reported(false, 42, 400));
    assert_eq!(
        followed,
        SmartOffBaseline {
            on: Some(false),
            bri: Some(42),
            ct: Some(400),
            active: true,
        }
    );
}

#[tokio::test]
async fn reset_smart_off_uses_the_device_state() {
    let h = harness().await;
    add_light(&h.controller, 1, |light| {
        light.smart_off = SmartOffBaseline {
            active: true,
            ..baseline(true, 10, 200)
        };
    })
    .await;
    h.gateway.set_state(LightId(1), reported(true, 77, 333)).await;

    let reset = h.controller.reset_smart_off(LightId(1)).await.expect("reset");
    assert_eq!(reset, baseline(true, 77, 333));
    let light = h.controller.light(LightId(1)).await.expect("light");
    assert_eq!(light.smart_off, reset);
}

#[tokio::test]
async fn reset_smart_off_clears_baseline_when_device_is_unreadable() {
    let h = harness().await;
    add_light(&h.controller, 1, |light| {
        light.smart_off = SmartOffBaseline {
            active: true,
            ..baseline(true, 10, 200)
        };
    })
    .await;
    h.gateway.set_offline(true).await;

    let reset = h.controller.reset_smart_off(LightId(1)).await.expect("reset");
    assert_eq!(reset, SmartOffBaseline::default());
}

#[tokio::test]
async fn toggling_the_setting_resets_every_baseline() {
    let h = harness().await;
    for id in 1..=2 {
        add_light(&h.controller, id, |light| {
            light.smart_off = SmartOffBaseline {
                active: true,
                ..baseline(true, 10, 200)
            };
        })
        .await;
        h.gateway.set_state(LightId(id), reported(false, 5, 450)).await;
    }

    let settings = h.controller.set_smart_off(false).await.expect("disable");
    assert!(!settings.smart_off);
    assert!(!h.controller.settings().await.expect("settings").smart_off);
    for light in h.controller.list_lights().await.expect("lights") {
        assert_eq!(light.smart_off, baseline(false, 5, 450));
    }

    // no change, no reset
    h.gateway.set_state(LightId(1), reported(true, 200, 200)).await;
    h.controller.set_smart_off(false).await.expect("again");
    let light = h.controller.light(LightId(1)).await.expect("light");
    assert_eq!(light.smart_off, baseline(false, 5, 450));
}
