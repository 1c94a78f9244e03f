//! Use case: interpret one client request.
//!
//! # Role checks first
//!
//! Privileged requests (`CMD`, `USERS`) verify the session role before
//! touching the vehicle or the registry.  A viewer therefore always gets
//! `ERROR 403 not_admin`, whatever the vehicle state is.
//!
//! # No I/O here
//!
//! [`Dispatcher::dispatch`] is synchronous and only *computes* the reply
//! lines.  The session writes them, so no lock taken in here can ever be
//! held across a socket write.

use std::sync::Arc;

use telemetry_core::{Request, Role, ServerLine};
use tracing::{debug, info};

use crate::application::registry::{Client, ClientRegistry};
use crate::application::vehicle::SharedVehicle;
use crate::domain::Credentials;

/// What the session should do after handling one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Lines to write, in order.
    pub lines: Vec<ServerLine>,
    /// Whether the session ends once the lines are written.
    pub close: bool,
}

impl Reply {
    fn one(line: ServerLine) -> Self {
        Self {
            lines: vec![line],
            close: false,
        }
    }

    fn many(lines: Vec<ServerLine>) -> Self {
        Self { lines, close: false }
    }
}

/// Routes parsed requests against the shared state.
pub struct Dispatcher {
    vehicle: Arc<SharedVehicle>,
    registry: Arc<ClientRegistry>,
    operator: Credentials,
}

impl Dispatcher {
    pub fn new(
        vehicle: Arc<SharedVehicle>,
        registry: Arc<ClientRegistry>,
        operator: Credentials,
    ) -> Self {
        Self {
            vehicle,
            registry,
            operator,
        }
    }

    pub fn dispatch(&self, client: &Client, request: Request) -> Reply {
        match request {
            Request::Hello { name } => self.hello(client, name),
            Request::Auth { user, pass } => self.auth(client, user, pass),
            Request::Cmd { subcommand } => self.command(client, subcommand),
            Request::Users => self.users(client),
            Request::Bye => Reply {
                lines: vec![ServerLine::Bye],
                close: true,
            },
            Request::Unknown { verb } => {
                debug!("client {} sent unknown verb {verb:?}", client.peer());
                Reply::one(ServerLine::unknown_command())
            }
        }
    }

    fn hello(&self, client: &Client, name: Option<String>) -> Reply {
        if let Some(name) = name {
            client.set_name(name);
        }
        Reply::one(ServerLine::HelloOk {
            name: client.name(),
        })
    }

    fn auth(&self, client: &Client, user: Option<String>, pass: Option<String>) -> Reply {
        let (Some(user), Some(pass)) = (user, pass) else {
            return Reply::one(ServerLine::invalid_credentials());
        };
        if !self.operator.matches(&user, &pass) {
            info!("client {} failed AUTH", client.peer());
            return Reply::one(ServerLine::invalid_credentials());
        }

        client.set_role(Role::Admin);
        info!("client {} ({}) is now ADMIN", client.peer(), client.name());
        Reply::many(vec![ServerLine::Role(Role::Admin), ServerLine::AuthOk])
    }

    fn command(&self, client: &Client, subcommand: Option<String>) -> Reply {
        if client.role() != Role::Admin {
            return Reply::one(ServerLine::not_admin());
        }
        let Some(subcommand) = subcommand else {
            return Reply::one(ServerLine::invalid_cmd());
        };

        let token = subcommand.to_ascii_uppercase();
        let outcome = self.vehicle.apply_command(&token);
        info!("client {} CMD {token} -> {outcome:?}", client.peer());

        match outcome.nack_reason() {
            None => Reply::one(ServerLine::Ack { command: token }),
            Some(reason) => Reply::one(ServerLine::Nack { reason }),
        }
    }

    fn users(&self, client: &Client) -> Reply {
        if client.role() != Role::Admin {
            return Reply::one(ServerLine::not_admin());
        }

        let rows = self.registry.list_snapshot();
        let mut lines = Vec::with_capacity(rows.len() + 2);
        lines.push(ServerLine::UsersHeader { count: rows.len() });
        lines.extend(rows.into_iter().map(ServerLine::User));
        lines.push(ServerLine::UsersEnd);
        Reply::many(lines)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use telemetry_core::{VehicleSnapshot, VehicleState};

    use super::*;
    use crate::application::sink::recording::RecordingSink;

    struct Fixture {
        dispatcher: Dispatcher,
        vehicle: Arc<SharedVehicle>,
        registry: Arc<ClientRegistry>,
    }

    fn fixture_with(vehicle: VehicleState) -> Fixture {
        let vehicle = Arc::new(SharedVehicle::new(vehicle));
        let registry = Arc::new(ClientRegistry::new());
        let dispatcher = Dispatcher::new(
            Arc::clone(&vehicle),
            Arc::clone(&registry),
            Credentials::default(),
        );
        Fixture {
            dispatcher,
            vehicle,
            registry,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(VehicleState::default())
    }

    fn client(port: u16) -> Arc<Client> {
        let peer: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
        Arc::new(Client::new(peer, Arc::new(RecordingSink::default())))
    }

    fn run(f: &Fixture, c: &Client, line: &str) -> Vec<String> {
        let request = Request::parse(line).expect("non-blank line");
        f.dispatcher
            .dispatch(c, request)
            .lines
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    fn admin(f: &Fixture, port: u16) -> Arc<Client> {
        let c = client(port);
        run(f, &c, "AUTH admin 1234");
        c
    }

    #[test]
    fn test_hello_sets_name() {
        let f = fixture();
        let c = client(1);
        assert_eq!(run(&f, &c, "HELLO bob"), vec!["OK hello bob"]);
        assert_eq!(c.name(), "bob");
    }

    #[test]
    fn test_hello_without_name_keeps_current_name() {
        let f = fixture();
        let c = client(1);
        assert_eq!(run(&f, &c, "HELLO"), vec!["OK hello anon"]);
    }

    #[test]
    fn test_auth_success_promotes_to_admin() {
        let f = fixture();
        let c = client(1);

        let out = run(&f, &c, "AUTH admin 1234");

        assert_eq!(out, vec!["ROLE ADMIN", "OK auth"]);
        assert_eq!(c.role(), Role::Admin);
    }

    #[test]
    fn test_auth_is_case_insensitive() {
        let f = fixture();
        let c = client(1);
        assert_eq!(run(&f, &c, "auth ADMIN 1234"), vec!["ROLE ADMIN", "OK auth"]);
    }

    #[test]
    fn test_auth_failure_keeps_role() {
        let f = fixture();
        let c = client(1);

        assert_eq!(
            run(&f, &c, "AUTH admin wrong"),
            vec!["ERROR 401 invalid_credentials"]
        );
        assert_eq!(run(&f, &c, "AUTH admin"), vec!["ERROR 401 invalid_credentials"]);
        assert_eq!(run(&f, &c, "AUTH"), vec!["ERROR 401 invalid_credentials"]);
        assert_eq!(c.role(), Role::Viewer);
    }

    #[test]
    fn test_auth_uses_configured_operator() {
        let vehicle = Arc::new(SharedVehicle::default());
        let registry = Arc::new(ClientRegistry::new());
        let dispatcher = Dispatcher::new(
            vehicle,
            registry,
            Credentials {
                username: "ops".into(),
                password: "pw".into(),
            },
        );
        let c = client(1);

        let reply = dispatcher.dispatch(&c, Request::parse("AUTH admin 1234").unwrap());
        assert_eq!(reply.lines, vec![ServerLine::invalid_credentials()]);

        let reply = dispatcher.dispatch(&c, Request::parse("AUTH ops pw").unwrap());
        assert_eq!(reply.lines, vec![ServerLine::Role(Role::Admin), ServerLine::AuthOk]);
    }

    #[test]
    fn test_viewer_cmd_is_forbidden_and_state_untouched() {
        // Arrange
        let f = fixture();
        let c = client(1);
        let before = f.vehicle.snapshot();

        // Act
        let out = run(&f, &c, "CMD SPEED_UP");

        // Assert
        assert_eq!(out, vec!["ERROR 403 not_admin"]);
        assert_eq!(f.vehicle.snapshot(), before);
    }

    #[test]
    fn test_viewer_cmd_is_forbidden_even_with_low_battery() {
        let f = fixture_with(VehicleState::from_snapshot(VehicleSnapshot {
            speed_kmh: 50.0,
            battery_pct: 5.0,
            temp_c: 35.0,
            heading_deg: 0.0,
        }));
        let c = client(1);
        assert_eq!(run(&f, &c, "CMD SPEED_UP"), vec!["ERROR 403 not_admin"]);
    }

    #[test]
    fn test_viewer_cmd_without_argument_is_forbidden() {
        let f = fixture();
        let c = client(1);
        assert_eq!(run(&f, &c, "CMD"), vec!["ERROR 403 not_admin"]);
    }

    #[test]
    fn test_admin_speed_up_is_acked() {
        let f = fixture();
        let c = admin(&f, 1);

        assert_eq!(run(&f, &c, "CMD speed_up"), vec!["ACK SPEED_UP accepted"]);
        assert_eq!(f.vehicle.snapshot().speed_kmh, 55.0);
    }

    #[test]
    fn test_admin_cmd_without_argument_is_invalid() {
        let f = fixture();
        let c = admin(&f, 1);
        assert_eq!(run(&f, &c, "CMD"), vec!["ERROR 400 invalid_cmd"]);
    }

    #[test]
    fn test_admin_unknown_subcommand_is_nacked() {
        let f = fixture();
        let c = admin(&f, 1);
        let before = f.vehicle.snapshot();

        assert_eq!(run(&f, &c, "CMD FLY"), vec!["NACK unknown_cmd"]);
        assert_eq!(f.vehicle.snapshot(), before);
    }

    #[test]
    fn test_admin_speed_limit_nack() {
        let f = fixture_with(VehicleState::from_snapshot(VehicleSnapshot {
            speed_kmh: 118.0,
            battery_pct: 100.0,
            temp_c: 35.0,
            heading_deg: 0.0,
        }));
        let c = admin(&f, 1);

        assert_eq!(run(&f, &c, "CMD SPEED_UP"), vec!["NACK speed_limit"]);
        assert_eq!(f.vehicle.snapshot().speed_kmh, 118.0);
    }

    #[test]
    fn test_admin_low_battery_nack_but_turn_allowed() {
        let f = fixture_with(VehicleState::from_snapshot(VehicleSnapshot {
            speed_kmh: 50.0,
            battery_pct: 9.0,
            temp_c: 35.0,
            heading_deg: 0.0,
        }));
        let c = admin(&f, 1);

        assert_eq!(run(&f, &c, "CMD SLOW_DOWN"), vec!["NACK low_battery"]);
        assert_eq!(run(&f, &c, "CMD TURN_RIGHT"), vec!["ACK TURN_RIGHT accepted"]);
    }

    #[test]
    fn test_viewer_users_is_forbidden() {
        let f = fixture();
        let c = client(1);
        assert_eq!(run(&f, &c, "USERS"), vec!["ERROR 403 not_admin"]);
    }

    #[test]
    fn test_admin_users_lists_registry() {
        // Arrange
        let f = fixture();
        let viewer = client(4001);
        run(&f, &viewer, "HELLO alice");
        let op = admin(&f, 4002);
        f.registry.add(Arc::clone(&viewer));
        f.registry.add(Arc::clone(&op));

        // Act
        let out = run(&f, &op, "USERS");

        // Assert
        assert_eq!(
            out,
            vec![
                "USERS count=2",
                "USER 0 ip=127.0.0.1 port=4001 role=VIEWER name=alice",
                "USER 1 ip=127.0.0.1 port=4002 role=ADMIN name=anon",
                "OK users",
            ]
        );
    }

    #[test]
    fn test_bye_closes_session() {
        let f = fixture();
        let c = client(1);
        let reply = f.dispatcher.dispatch(&c, Request::Bye);
        assert_eq!(reply.lines, vec![ServerLine::Bye]);
        assert!(reply.close);
    }

    #[test]
    fn test_unknown_verb() {
        let f = fixture();
        let c = client(1);
        assert_eq!(run(&f, &c, "JUMP"), vec!["ERROR 400 unknown_command"]);
    }
}
