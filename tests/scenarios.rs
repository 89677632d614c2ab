use chrono::NaiveDate;
use contagion::epidemic::{AgeRange, DatedIntervention, Intervention, Variant};
use contagion::prelude::*;
use contagion::sim::InitialCondition;

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 2, 1).unwrap() + chrono::Duration::days(day as i64)
}

fn scenario(seed: u64, per_age: u32) -> Scenario {
    Scenario {
        seed,
        start_date: date(0),
        age_counts: vec![per_age; 100],
        hospital_beds: 100,
        icu_units: 20,
        ..Scenario::default()
    }
}

fn import(day: u32, amount: usize) -> DatedIntervention {
    DatedIntervention::new(
        date(day),
        Intervention::ImportInfections {
            amount,
            variant: None,
        },
    )
}

/// Properties that must hold after every successful day.
fn check_invariants(sim: &Context, state: &DayState) {
    let pop = sim.pop();
    let nr_ages = pop.nr_ages();

    // conservation per age
    for a in 0..nr_ages {
        let total =
            state.susceptible[a] + state.infected[a] + state.recovered[a] + state.dead[a];
        assert_eq!(total, pop.initial_count(a as u8), "age {} not conserved", a);
    }

    // cumulative series bound the current ones
    let current = state.total_infected() + state.total_recovered() + state.total_dead();
    assert!(
        state.total_all_infected() >= current.saturating_sub(seeded_people(sim)),
        "all_infected fell behind"
    );
    assert!(state.total_all_detected() >= state.total_detected());

    // healthcare accounting
    assert!(state.available_hospital_beds <= state.total_hospital_beds);
    assert!(state.available_icu_units <= state.total_icu_units);
    assert_eq!(
        state.total_hospitalized() as usize,
        state.total_hospital_beds - state.available_hospital_beds,
        "each hospitalized person holds exactly one bed"
    );
    assert_eq!(
        state.total_in_icu() as usize,
        state.total_icu_units - state.available_icu_units,
        "each ICU person holds exactly one unit"
    );

    // the incremental counters agree with a recount of the person array
    let census = pop.census();
    assert_eq!(census.infected, state.infected);
    assert_eq!(census.recovered, state.recovered);
    assert_eq!(census.dead, state.dead);
    assert_eq!(census.hospitalized, state.hospitalized);
    assert_eq!(census.in_icu, state.in_icu);
    assert_eq!(census.detected, state.detected);
    assert_eq!(census.vaccinated, state.vaccinated);

    // flag consistency on every person
    for p in pop.people() {
        assert_eq!(
            p.is_infected(),
            p.state().is_active(),
            "is_infected out of sync for agent {}",
            p.idx()
        );
    }

    // venue counts match the exposures recorded for sources
    assert_eq!(state.total_daily_contacts(), state.exposed_per_day as u64);
}

// Day-0 seeded agents are excluded from the cumulative series, so the
// monotonicity bound must discount them.
fn seeded_people(sim: &Context) -> u64 {
    sim.pop()
        .people()
        .iter()
        .filter(|p| !p.included_in_totals())
        .count() as u64
}

fn run_checked(sim: &mut Context, days: usize) {
    for _ in 0..days {
        let state = sim.iterate().unwrap();
        check_invariants(sim, &state);
    }
}

#[test]
fn dormant_epidemic_stays_dormant() {
    let mut sim = scenario(7, 100).build().unwrap();
    run_checked(&mut sim, 90);

    let last = sim.history().last().unwrap();
    assert_eq!(last.total_infected(), 0);
    assert_eq!(last.total_all_infected(), 0);
    assert_eq!(last.total_dead(), 0);
    assert_eq!(last.total_susceptible(), 10_000);
    assert_eq!(last.mobility_limitation, 0.0);
    assert_eq!(sim.healthcare().testing_mode(), TestingMode::NoTesting);
}

#[test]
fn single_seed_produces_an_outbreak() {
    let mut cfg = scenario(42, 100);
    cfg.interventions = vec![import(0, 1)];
    let mut sim = cfg.build().unwrap();
    run_checked(&mut sim, 30);

    let last = sim.history().last().unwrap();
    assert!(last.total_all_infected() >= 1);
    assert!(last.total_dead() <= last.total_all_infected());
}

#[test]
fn lockdown_reduces_transmission() {
    let run = |lockdown: bool| {
        let mut cfg = scenario(42, 100);
        cfg.interventions = vec![import(0, 10)];
        if lockdown {
            cfg.interventions.push(DatedIntervention::new(
                date(5),
                Intervention::LimitMobility {
                    reduction: 80.0,
                    place: None,
                    ages: None,
                },
            ));
        }
        let mut sim = cfg.build().unwrap();
        run_checked(&mut sim, 60);
        sim
    };

    let baseline = run(false);
    let locked = run(true);

    for state in locked.history() {
        let expected = if state.day >= 5 { 0.8 } else { 0.0 };
        assert!((state.mobility_limitation - expected).abs() < 1e-9);
    }

    let r_baseline = baseline.history().last().unwrap().r;
    let r_locked = locked.history().last().unwrap().r;
    assert!(r_baseline > 0.0, "baseline epidemic should have taken off");
    assert!(
        r_locked < r_baseline,
        "lockdown should reduce r ({} vs {})",
        r_locked,
        r_baseline
    );
    assert!(
        locked.history().last().unwrap().total_all_infected()
            <= baseline.history().last().unwrap().total_all_infected()
    );
}

#[test]
fn capacity_overwhelm_kills() {
    let mut cfg = scenario(11, 500);
    cfg.hospital_beds = 5;
    cfg.icu_units = 0;
    cfg.interventions = vec![DatedIntervention::new(
        date(0),
        Intervention::ImportInfectionsWeekly {
            weekly_amount: 100,
            variant: None,
        },
    )];
    let mut sim = cfg.build().unwrap();

    // track every critical-or-worse case that wins a ward bed
    let mut ward_critical = std::collections::HashSet::new();
    for _ in 0..60 {
        let state = sim.iterate().unwrap();
        check_invariants(&sim, &state);
        assert!(state.available_hospital_beds <= 5);
        // with no ICU units nobody ever reaches intensive care
        assert_eq!(state.total_in_icu(), 0);
        for p in sim.pop().people() {
            if p.state() == PersonState::Hospitalized
                && p.severity() >= SymptomSeverity::Critical
            {
                ward_critical.insert(p.idx());
            }
        }
    }

    let last = sim.history().last().unwrap();
    assert!(last.total_dead() > 0, "an overwhelmed system loses patients");
    // every critical case that reached hospitalization died: the ICU
    // transfer is always denied and the denial is fatal with the default
    // parameters, so the only survivors of the tracked set are the ones
    // still waiting out their ward stay
    assert!(
        !ward_critical.is_empty(),
        "no critical case ever reached a ward"
    );
    for &id in &ward_critical {
        let p = sim.pop().person(id);
        assert!(
            p.state() == PersonState::Dead || p.state() == PersonState::Hospitalized,
            "ward-admitted critical agent {} survived the ICU denial",
            id
        );
    }
    // deaths only ever happen to severe and worse courses
    for p in sim.pop().people() {
        if p.state() == PersonState::Dead {
            assert!(p.severity() >= SymptomSeverity::Severe);
        }
    }
}

#[test]
fn contact_tracing_queues_contacts() {
    let mut cfg = scenario(42, 100);
    cfg.interventions = vec![
        // tracing first, so the day-0 imports track their infectees too
        DatedIntervention::new(
            date(0),
            Intervention::TestWithContactTracing { efficiency: 100.0 },
        ),
        import(0, 5),
    ];
    let mut sim = cfg.build().unwrap();

    let mut traced = 0;
    for _ in 0..45 {
        let state = sim.iterate().unwrap();
        check_invariants(&sim, &state);
        traced += state.ct_cases_per_day;

        // with full efficiency, the infector of every detected agent is
        // handled already, sitting in tomorrow's queue, or was tested while
        // past the infectious window and therefore not detectable
        for p in sim.pop().people() {
            if !(p.was_detected() && p.state().is_active()) {
                continue;
            }
            if let Some(infector) = p.infector() {
                let src = sim.pop().person(infector);
                let handled = src.was_detected()
                    || src.queued_for_testing()
                    || src.state().is_removed();
                let undetectable = src.infection_day_offset().map_or(true, |offset| {
                    sim.disease()
                        .variant(src.variant())
                        .infectiousness_at(offset)
                        <= 0.0
                });
                assert!(
                    handled || undetectable,
                    "undetected infector {} of {} escaped tracing",
                    infector,
                    p.idx()
                );
            }
        }
    }
    assert!(traced > 0, "tracing never fired");
    assert!(sim.history().iter().any(|s| s.total_all_detected() > 0));
}

#[test]
fn vaccination_targets_the_requested_ages() {
    let mut cfg = scenario(42, 100);
    cfg.interventions = vec![
        import(0, 1),
        DatedIntervention::new(
            date(10),
            Intervention::Vaccinate {
                weekly_vaccinations: 7000,
                min_age: 70,
                max_age: 99,
            },
        ),
    ];
    let mut sim = cfg.build().unwrap();
    run_checked(&mut sim, 40);

    let last = sim.history().last().unwrap();
    let elderly = last.vaccinated_in(AgeRange::new(70, 99));
    let younger = last.vaccinated_in(AgeRange::new(0, 69));
    assert_eq!(younger, 0);
    // 1000 doses/day from day 10 saturate the 3000-person target range;
    // only the dead and the detected are skipped
    assert!(elderly >= 2900, "elderly vaccinated = {}", elderly);
    assert!(elderly <= 3000);

    // vaccination is monotone over time
    let mut previous = 0;
    for state in sim.history() {
        let now = state.total_vaccinated();
        assert!(now >= previous);
        previous = now;
    }
}

#[test]
fn zero_infectiousness_never_spreads() {
    let mut wild = Variant::wild_type();
    wild.set_infectiousness_multiplier(0.0);
    let mut cfg = scenario(5, 100);
    cfg.disease = Disease::new(wild, &[]).unwrap();
    cfg.interventions = vec![import(0, 50)];
    let mut sim = cfg.build().unwrap();
    run_checked(&mut sim, 30);

    // imports happened, secondary infections did not
    let last = sim.history().last().unwrap();
    assert_eq!(last.total_all_infected(), 50);
    for p in sim.pop().people() {
        assert_eq!(p.other_people_infected(), 0);
    }
}

#[test]
fn no_beds_means_no_admissions() {
    let mut cfg = scenario(3, 200);
    cfg.hospital_beds = 0;
    cfg.icu_units = 0;
    cfg.interventions = vec![import(0, 50)];
    let mut sim = cfg.build().unwrap();

    for _ in 0..60 {
        let state = sim.iterate().unwrap();
        check_invariants(&sim, &state);
        assert_eq!(state.total_hospitalized(), 0);
        assert_eq!(state.total_in_icu(), 0);
    }
}

#[test]
fn vaccinating_a_single_age_only_touches_it() {
    let mut cfg = scenario(9, 50);
    cfg.interventions = vec![DatedIntervention::new(
        date(0),
        Intervention::Vaccinate {
            weekly_vaccinations: 700,
            min_age: 40,
            max_age: 40,
        },
    )];
    let mut sim = cfg.build().unwrap();
    run_checked(&mut sim, 10);

    let last = sim.history().last().unwrap();
    for (age, &count) in last.vaccinated.iter().enumerate() {
        if age == 40 {
            assert!(count <= 50);
        } else {
            assert_eq!(count, 0, "age {} should not be vaccinated", age);
        }
    }
    assert_eq!(last.vaccinated_in(AgeRange::new(40, 40)), 50);
}

#[test]
fn fixed_seed_reproduces_the_run() {
    let build = || {
        let mut cfg = scenario(1234, 100);
        cfg.interventions = vec![import(0, 10)];
        cfg.build().unwrap()
    };
    let mut a = build();
    let mut b = build();
    a.run(25).unwrap();
    b.run(25).unwrap();
    assert_eq!(a.history(), b.history());
}

#[test]
fn zero_reduction_mobility_is_a_noop_end_to_end() {
    let run = |with_noop: bool| {
        let mut cfg = scenario(77, 100);
        cfg.interventions = vec![import(0, 10)];
        if with_noop {
            cfg.interventions.push(DatedIntervention::new(
                date(3),
                Intervention::LimitMobility {
                    reduction: 0.0,
                    place: None,
                    ages: None,
                },
            ));
        }
        let mut sim = cfg.build().unwrap();
        sim.run(20).unwrap();
        sim
    };
    let plain = run(false);
    let noop = run(true);
    assert_eq!(plain.history(), noop.history());
}

#[test]
fn masks_and_weekly_imports_coexist() {
    let mut cfg = scenario(8, 100);
    cfg.interventions = vec![
        DatedIntervention::new(
            date(0),
            Intervention::ImportInfectionsWeekly {
                weekly_amount: 14,
                variant: None,
            },
        ),
        DatedIntervention::new(
            date(2),
            Intervention::WearMasks {
                share_of_contacts: 80.0,
                place: None,
                ages: None,
            },
        ),
    ];
    let mut sim = cfg.build().unwrap();
    run_checked(&mut sim, 30);

    // two imports per day, every day
    let last = sim.history().last().unwrap();
    assert!(last.total_all_infected() >= 30 * 2);
    // masks do not show up as a mobility limitation
    assert_eq!(last.mobility_limitation, 0.0);
}

#[test]
fn initial_condition_is_respected_end_to_end() {
    let mut cfg = scenario(6, 100);
    cfg.initial = InitialCondition {
        incubating: 10,
        ill: 5,
        dead: 3,
        in_ward: 2,
        in_icu: 1,
        confirmed_cases: 5,
    };
    let mut sim = cfg.build().unwrap();

    let state = sim.generate_state();
    assert_eq!(state.total_infected(), 18);
    assert_eq!(state.total_dead(), 3);
    assert_eq!(state.total_hospitalized(), 2);
    assert_eq!(state.total_in_icu(), 1);

    // seeded agents run through the ordinary state machine afterwards
    for _ in 0..30 {
        let state = sim.iterate().unwrap();
        for a in 0..100 {
            let total =
                state.susceptible[a] + state.infected[a] + state.recovered[a] + state.dead[a];
            assert_eq!(total, 100);
        }
    }
}
