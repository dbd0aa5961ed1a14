use super::{DriverCommand, EvseDriver};
use crate::controller::RequestSource;

impl EvseDriver {
    /// Apply one external command; returns false when the driver should stop
    pub fn handle_command(&mut self, cmd: DriverCommand) -> bool {
        match cmd {
            DriverCommand::SetEnabled(enabled) => {
                self.controller.set_enabled(enabled);
                if let Err(e) = self.persistence.set_enabled(enabled) {
                    self.logger
                        .warn(&format!("Failed to persist enabled flag: {}", e));
                }
            }
            DriverCommand::SetCurrentLimit { amps, reply } => {
                let applied = self.set_current_limit(amps);
                let _ = reply.send(applied);
            }
            DriverCommand::StartCharging { source, reply } => {
                let _ = reply.send(self.controller.start_charging_request(source));
            }
            DriverCommand::StartChargingRemote {
                source,
                limit_amps,
                reply,
            } => {
                let result = match (source, limit_amps) {
                    (RequestSource::Remote, limit) => {
                        let result = self.bridge.on_remote_start(limit, &mut self.controller);
                        let applied = self.controller.offered_current();
                        self.persist_current_limit(applied);
                        result
                    }
                    (_, Some(amps)) => {
                        self.set_current_limit(amps);
                        self.controller.start_charging_remote(source)
                    }
                    (_, None) => self.controller.start_charging_remote(source),
                };
                let _ = reply.send(result);
            }
            DriverCommand::StopCharging { source, reply } => {
                let result = match source {
                    RequestSource::Remote => self.bridge.on_remote_stop(&mut self.controller),
                    _ => self.controller.stop_charging_request(source),
                };
                let _ = reply.send(result);
            }
            DriverCommand::AcknowledgeFault { reply } => {
                let _ = reply.send(self.controller.acknowledge_fault());
            }
            DriverCommand::Transaction(status) => {
                let action = self.bridge.observe(status, &mut self.controller);
                self.logger
                    .debug(&format!("Transaction update handled: {:?}", action));
            }
            DriverCommand::Simulate(inputs) => match &self.sim {
                Some(sim) => {
                    sim.apply(&inputs);
                    self.logger
                        .info(&format!("Simulated inputs applied: {:?}", inputs));
                }
                None => self
                    .logger
                    .warn("Simulation requested but hardware is not simulated"),
            },
            DriverCommand::GetSessions { reply } => {
                let _ = reply.send(self.sessions.history());
            }
            DriverCommand::Shutdown => {
                self.logger.info("Shutdown requested");
                return false;
            }
        }

        self.process_events();
        self.publish_snapshot();
        true
    }

    fn set_current_limit(&mut self, amps: i32) -> i32 {
        let applied = self.controller.set_current_limit(amps);
        self.persist_current_limit(applied);
        applied
    }

    fn persist_current_limit(&mut self, amps: i32) {
        if let Err(e) = self.persistence.set_current_limit(amps) {
            self.logger
                .warn(&format!("Failed to persist current limit: {}", e));
        }
    }
}
