use std::time::Instant;

use signal_env::{
    Controller, DecisionEnvironment, EnvConfig, FixedTime, JunctionSimulation, ScenarioConfig,
    Sotl,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let scenario = match args.next() {
        Some(path) => ScenarioConfig::load(path)?,
        None => ScenarioConfig::four_way(),
    };
    let mut controller: Box<dyn Controller> = match args.next().as_deref() {
        None | Some("fixed") => Box::new(FixedTime::default()),
        Some("sotl") => Box::new(Sotl),
        Some(other) => return Err(format!("unknown controller {:?}", other).into()),
    };

    let config = EnvConfig {
        junction_id: scenario.junction_id.clone(),
        seed: Some(scenario.seed),
        ..Default::default()
    };
    let mut env = DecisionEnvironment::new(JunctionSimulation::new(scenario)?, config);

    println!("Simulating...");
    let start = Instant::now();
    let (_, mut info) = env.reset()?;
    controller.reset();
    let mut total_reward = 0.0;
    let mut steps = 0;
    loop {
        let action = controller.decide(&info);
        let result = env.step(action)?;
        total_reward += result.reward;
        steps += 1;
        println!(
            "t = {:>4} s  phase {}  {:?} -> reward {:.1}",
            result.info.step_time, result.info.this_phase_index, action, result.reward
        );
        info = result.info;
        if result.done || result.truncated {
            break;
        }
    }
    env.close();
    println!(
        "{} decision steps in {:?}, total reward {:.1}",
        steps,
        start.elapsed(),
        total_reward
    );
    Ok(())
}
