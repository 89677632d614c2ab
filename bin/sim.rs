use std::{env, fs};

use contagion::prelude::*;
use log::{error, info};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct Row {
    day: u32,
    date: String,
    susceptible: u64,
    infected: u64,
    all_infected: u64,
    detected: u64,
    all_detected: u64,
    recovered: u64,
    hospitalized: u64,
    in_icu: u64,
    dead: u64,
    vaccinated: u64,
    available_beds: usize,
    available_icu_units: usize,
    r: Real,
    mobility_limitation: Real,
}

impl Row {
    fn from_state(state: &DayState) -> Self {
        Row {
            day: state.day,
            date: state.date.to_string(),
            susceptible: state.total_susceptible(),
            infected: state.total_infected(),
            all_infected: state.total_all_infected(),
            detected: state.total_detected(),
            all_detected: state.total_all_detected(),
            recovered: state.total_recovered(),
            hospitalized: state.total_hospitalized(),
            in_icu: state.total_in_icu(),
            dead: state.total_dead(),
            vaccinated: state.total_vaccinated(),
            available_beds: state.available_hospital_beds,
            available_icu_units: state.available_icu_units,
            r: state.r,
            mobility_limitation: state.mobility_limitation,
        }
    }
}

pub fn main() {
    use simple_logger::SimpleLogger;
    SimpleLogger::new().init().unwrap();

    let path = env::args().nth(1).unwrap_or_else(|| "conf.toml".to_string());
    let scenario = match fs::read_to_string(&path) {
        Ok(data) => Scenario::from_toml(&data).unwrap(),
        Err(_) => {
            info!("no {} found, running the default scenario", path);
            Scenario::default()
        }
    };

    let num_days = scenario.num_days;
    let mut sim = scenario.build().unwrap();
    let mut writer = csv::Writer::from_path("epicurve.csv").unwrap();

    for _ in 0..num_days {
        match sim.iterate() {
            Ok(state) => writer.serialize(Row::from_state(&state)).unwrap(),
            Err(err) => {
                error!("{}", err);
                break;
            }
        }
    }
    writer.flush().unwrap();

    if let Some(last) = sim.history().last() {
        info!(
            "day {}: {} infected so far, {} dead, r = {:.2}",
            last.day,
            last.total_all_infected(),
            last.total_dead(),
            last.r
        );
    }
    info!("wrote epicurve.csv ({} days)", sim.day());
}
