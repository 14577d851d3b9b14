use crate::domain::selection::Optimizer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Particle swarm search over the unit box, the default [`Optimizer`].
/// Each step pulls a particle toward its own best point and the swarm's
/// best point, then clamps it back into the box.
#[derive(Debug, Clone)]
pub struct ParticleSwarm {
    pub swarm_size: usize,
    pub iterations: usize,
    /// Velocity carried over between steps.
    pub inertia: f64,
    /// Pull toward the particle's own best point.
    pub cognitive: f64,
    /// Pull toward the swarm's best point.
    pub social: f64,
    /// Fixed seed for reproducible runs; entropy when unset.
    pub seed: Option<u64>,
}

impl Default for ParticleSwarm {
    fn default() -> Self {
        Self {
            swarm_size: 50,
            iterations: 200,
            inertia: 0.5,
            cognitive: 0.5,
            social: 0.5,
            seed: None,
        }
    }
}

impl ParticleSwarm {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

struct Particle {
    position: Vec<f64>,
    velocity: Vec<f64>,
    best_position: Vec<f64>,
    best_value: f64,
}

impl Optimizer for ParticleSwarm {
    fn maximize(&self, dims: usize, objective: &dyn Fn(&[f64]) -> f64) -> Vec<f64> {
        if dims == 0 || self.swarm_size == 0 {
            return vec![0.0; dims];
        }

        let mut rng = self.rng();
        let mut particles: Vec<Particle> = (0..self.swarm_size)
            .map(|_| {
                let position: Vec<f64> = (0..dims).map(|_| rng.gen::<f64>()).collect();
                let velocity = (0..dims).map(|_| rng.gen_range(-1.0..=1.0)).collect();
                let value = objective(&position);
                Particle {
                    best_position: position.clone(),
                    position,
                    velocity,
                    best_value: value,
                }
            })
            .collect();

        let (mut global_best, mut global_value) = particles
            .iter()
            .max_by(|a, b| a.best_value.total_cmp(&b.best_value))
            .map(|p| (p.best_position.clone(), p.best_value))
            .unwrap_or_else(|| (vec![0.0; dims], f64::NEG_INFINITY));

        for _ in 0..self.iterations {
            for particle in &mut particles {
                for d in 0..dims {
                    let rp: f64 = rng.gen();
                    let rg: f64 = rng.gen();
                    particle.velocity[d] = self.inertia * particle.velocity[d]
                        + self.cognitive * rp * (particle.best_position[d] - particle.position[d])
                        + self.social * rg * (global_best[d] - particle.position[d]);
                    particle.position[d] =
                        (particle.position[d] + particle.velocity[d]).clamp(0.0, 1.0);
                }

                let value = objective(&particle.position);
                if value > particle.best_value {
                    particle.best_value = value;
                    particle.best_position.clone_from(&particle.position);
                    if value > global_value {
                        global_value = value;
                        global_best.clone_from(&particle.position);
                    }
                }
            }
        }

        tracing::debug!(
            "Swarm finished {} iterations with best objective {:.3}",
            self.iterations,
            global_value
        );
        global_best
    }
}
