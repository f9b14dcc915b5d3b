/// Health status of an agent.
///
/// Transitions only ever go `Susceptible -> Infected -> Recovered`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Status {
    Susceptible,
    Infected,
    Recovered,
}

/// Visual radius shared by every agent.
pub const AGENT_RADIUS: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct Agent {
    x: f64,
    y: f64,

    vx: f64,
    vy: f64,

    radius: f64,

    status: Status,
    infection_timer: f64,
}

impl Agent {
    pub fn new(x: f64, y: f64, vx: f64, vy: f64) -> Self {
        Self {
            x,
            y,
            vx,
            vy,
            radius: AGENT_RADIUS,
            status: Status::Susceptible,
            infection_timer: 0.0,
        }
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    pub fn velocity(&self) -> (f64, f64) {
        (self.vx, self.vy)
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn infection_timer(&self) -> f64 {
        self.infection_timer
    }

    pub fn distance_to(&self, other: &Agent) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Advance the position by one velocity step and bounce off the walls.
    ///
    /// Each axis is checked on its own, so an agent past both limits
    /// reflects both velocity components in the same call.
    pub fn move_within(&mut self, width: f64, height: f64) {
        self.x += self.vx;
        self.y += self.vy;

        if self.x <= 0.0 || self.x >= width {
            self.vx = -self.vx;
        }
        if self.y <= 0.0 || self.y >= height {
            self.vy = -self.vy;
        }
    }

    /// Mark a susceptible agent as infected and restart its timer.
    ///
    /// Has no effect on infected or recovered agents.
    pub fn infect(&mut self) {
        if self.status == Status::Susceptible {
            self.status = Status::Infected;
            self.infection_timer = 0.0;
        }
    }

    /// Accumulate `dt` of infection time and recover once the timer
    /// exceeds `recovery_time`. Returns `true` if the agent recovered now.
    pub fn progress_infection(&mut self, dt: f64, recovery_time: f64) -> bool {
        match self.status {
            Status::Infected => {
                self.infection_timer += dt;
                if self.infection_timer > recovery_time {
                    self.status = Status::Recovered;
                    return true;
                }
                false
            }
            Status::Susceptible | Status::Recovered => false,
        }
    }
}
