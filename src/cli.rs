//! Command-line surface.
//!
//! Arguments are parsed by hand into [`Command`]; [`App`] executes a command
//! against any [`Store`] / [`OtpVerifier`] pair and writes human-readable
//! output to the supplied writer.

use crate::client::Store;
use crate::models::rows::{DeviceId, HouseId, RoomId, ShareId, SwitchId, UserId};
use crate::otp::OtpVerifier;
use crate::services::auth::{self, SignupForm};
use crate::services::claim::ClaimFlow;
use crate::services::prompt::{ELECTRONIC_OBJECTS, ICON_NAMES, PlacementPrompt, PromptError, PromptSubmit};
use crate::services::scanner::{LineCapture, PollTask, ScanLoop, TextPayloadDecoder};
use crate::services::{admin, devices, homes, labels, sharing, switches};
use crate::session::{Role, Session, SessionUser};
use crate::utils::{mask_secret, or_dash};
use log::info;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

pub const USAGE: &str = "\
usage: switchhub [--env-file PATH] <command> [args]

account:
  otp <phone>                               send a one-time password
  login <customer|admin|superadmin> <phone> <otp>
  signup <full-name> <phone> <email> <otp>
  logout | whoami

claiming:
  claim <code> --house ID --room ID --category NAME [--name TEXT] [--icon NAME]
  scan --house ID --room ID --category NAME [--name TEXT] [--icon NAME]
        (reads decoded payloads line by line from stdin, e.g. `zbarcam --raw | switchhub scan ...`)
  categories | icons

devices:
  devices list | rename <id> <name> | release <id> | release-all

sharing:
  share device <device-id> <phone> | share switch <switch-id> <phone>
  share revoke-device <share-id> | share revoke-switch <share-id>
  share sent | share received

homes:
  houses list | add <name> | rename <id> <name> | delete <id>
  rooms list <house-id> | add <house-id> <type> [description]
  rooms update <room-id> <type> [description] | delete <room-id>
  switches list <room-id> | on <id> | off <id> | toggle <id> | label <id> <category> | delete <id>

staff:
  admin generate <count> [--qr-dir DIR] | devices [--qr-dir DIR] | qr <device-id>
  admin m2m <device-id> <number|\"\"> | delete-device <id>
  admin customers | delete-customer <id>
  admin employees | delete-employee <id> | logs [limit]      (super-admin)

misc:
  health | help";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub house: HouseId,
    pub room: RoomId,
    pub category: String,
    pub name: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DevicesCmd {
    List,
    Rename(DeviceId, String),
    Release(DeviceId),
    ReleaseAll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareCmd {
    Device(DeviceId, String),
    Switch(SwitchId, String),
    RevokeDevice(ShareId),
    RevokeSwitch(ShareId),
    Sent,
    Received,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HousesCmd {
    List,
    Add(String),
    Rename(HouseId, String),
    Delete(HouseId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomsCmd {
    List(HouseId),
    Add(HouseId, String, Option<String>),
    Update(RoomId, String, Option<String>),
    Delete(RoomId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchesCmd {
    List(RoomId),
    Set(SwitchId, bool),
    Toggle(SwitchId),
    Label(SwitchId, String),
    Delete(SwitchId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCmd {
    /// Count, plus a directory for SVG labels.
    Generate(usize, Option<PathBuf>),
    Devices(Option<PathBuf>),
    Qr(DeviceId),
    M2m(DeviceId, String),
    DeleteDevice(DeviceId),
    Customers,
    DeleteCustomer(UserId),
    Employees,
    DeleteEmployee(UserId),
    Logs(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Health,
    Categories,
    Icons,
    SendOtp(String),
    Login { role: Role, phone: String, otp: String },
    Signup { full_name: String, phone: String, email: String, otp: String },
    Logout,
    WhoAmI,
    Claim { code: String, placement: Placement },
    Scan(Placement),
    Devices(DevicesCmd),
    Share(ShareCmd),
    Houses(HousesCmd),
    Rooms(RoomsCmd),
    Switches(SwitchesCmd),
    Admin(AdminCmd),
}

fn id(raw: &str, what: &str) -> Result<i64, String> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| format!("invalid {} id: {}", what, raw))
}

fn count(raw: &str) -> Result<usize, String> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| format!("invalid number: {}", raw))
}

fn parse_placement(args: &[String]) -> Result<Placement, String> {
    let mut house = None;
    let mut room = None;
    let mut category = None;
    let mut name = None;
    let mut icon = None;
    let mut it = args.iter();
    while let Some(flag) = it.next() {
        let mut value = || {
            it.next()
                .cloned()
                .ok_or_else(|| format!("`{}` requires a value", flag))
        };
        match flag.as_str() {
            "--house" => house = Some(HouseId(id(&value()?, "house")?)),
            "--room" => room = Some(RoomId(id(&value()?, "room")?)),
            "--category" => category = Some(value()?),
            "--name" => name = Some(value()?),
            "--icon" => icon = Some(value()?),
            other => return Err(format!("unrecognised argument: {}", other)),
        }
    }
    Ok(Placement {
        house: house.ok_or("`--house` is required")?,
        room: room.ok_or("`--room` is required")?,
        category: category.ok_or("`--category` is required")?,
        name,
        icon,
    })
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Command, String> {
        let words: Vec<&str> = args.iter().map(String::as_str).collect();
        let cmd = match words.as_slice() {
            [] | ["help"] | ["--help"] | ["-h"] => Command::Help,
            ["health"] => Command::Health,
            ["categories"] => Command::Categories,
            ["icons"] => Command::Icons,
            ["otp", phone] => Command::SendOtp(phone.to_string()),
            ["login", role, phone, otp] => Command::Login {
                role: Role::parse(role)?,
                phone: phone.to_string(),
                otp: otp.to_string(),
            },
            ["signup", name, phone, email, otp] => Command::Signup {
                full_name: name.to_string(),
                phone: phone.to_string(),
                email: email.to_string(),
                otp: otp.to_string(),
            },
            ["logout"] => Command::Logout,
            ["whoami"] => Command::WhoAmI,
            ["claim", code, ..] => Command::Claim {
                code: code.to_string(),
                placement: parse_placement(&args[2..])?,
            },
            ["scan", ..] => Command::Scan(parse_placement(&args[1..])?),

            ["devices", "list"] => Command::Devices(DevicesCmd::List),
            ["devices", "rename", d, name] => Command::Devices(DevicesCmd::Rename(DeviceId(id(d, "device")?), name.to_string())),
            ["devices", "release", d] => Command::Devices(DevicesCmd::Release(DeviceId(id(d, "device")?))),
            ["devices", "release-all"] => Command::Devices(DevicesCmd::ReleaseAll),

            ["share", "device", d, phone] => Command::Share(ShareCmd::Device(DeviceId(id(d, "device")?), phone.to_string())),
            ["share", "switch", s, phone] => Command::Share(ShareCmd::Switch(SwitchId(id(s, "switch")?), phone.to_string())),
            ["share", "revoke-device", s] => Command::Share(ShareCmd::RevokeDevice(ShareId(id(s, "share")?))),
            ["share", "revoke-switch", s] => Command::Share(ShareCmd::RevokeSwitch(ShareId(id(s, "share")?))),
            ["share", "sent"] => Command::Share(ShareCmd::Sent),
            ["share", "received"] => Command::Share(ShareCmd::Received),

            ["houses", "list"] => Command::Houses(HousesCmd::List),
            ["houses", "add", name] => Command::Houses(HousesCmd::Add(name.to_string())),
            ["houses", "rename", h, name] => Command::Houses(HousesCmd::Rename(HouseId(id(h, "house")?), name.to_string())),
            ["houses", "delete", h] => Command::Houses(HousesCmd::Delete(HouseId(id(h, "house")?))),

            ["rooms", "list", h] => Command::Rooms(RoomsCmd::List(HouseId(id(h, "house")?))),
            ["rooms", "add", h, kind, rest @ ..] if rest.len() <= 1 => Command::Rooms(RoomsCmd::Add(
                HouseId(id(h, "house")?),
                kind.to_string(),
                rest.first().map(|s| s.to_string()),
            )),
            ["rooms", "update", r, kind, rest @ ..] if rest.len() <= 1 => Command::Rooms(RoomsCmd::Update(
                RoomId(id(r, "room")?),
                kind.to_string(),
                rest.first().map(|s| s.to_string()),
            )),
            ["rooms", "delete", r] => Command::Rooms(RoomsCmd::Delete(RoomId(id(r, "room")?))),

            ["switches", "list", r] => Command::Switches(SwitchesCmd::List(RoomId(id(r, "room")?))),
            ["switches", "on", s] => Command::Switches(SwitchesCmd::Set(SwitchId(id(s, "switch")?), true)),
            ["switches", "off", s] => Command::Switches(SwitchesCmd::Set(SwitchId(id(s, "switch")?), false)),
            ["switches", "toggle", s] => Command::Switches(SwitchesCmd::Toggle(SwitchId(id(s, "switch")?))),
            ["switches", "label", s, label] => {
                Command::Switches(SwitchesCmd::Label(SwitchId(id(s, "switch")?), label.to_string()))
            }
            ["switches", "delete", s] => Command::Switches(SwitchesCmd::Delete(SwitchId(id(s, "switch")?))),

            ["admin", "generate", n] => Command::Admin(AdminCmd::Generate(count(n)?, None)),
            ["admin", "generate", n, "--qr-dir", dir] => {
                Command::Admin(AdminCmd::Generate(count(n)?, Some(PathBuf::from(dir))))
            }
            ["admin", "devices"] => Command::Admin(AdminCmd::Devices(None)),
            ["admin", "devices", "--qr-dir", dir] => Command::Admin(AdminCmd::Devices(Some(PathBuf::from(dir)))),
            ["admin", "qr", d] => Command::Admin(AdminCmd::Qr(DeviceId(id(d, "device")?))),
            ["admin", "m2m", d, number] => Command::Admin(AdminCmd::M2m(DeviceId(id(d, "device")?), number.to_string())),
            ["admin", "delete-device", d] => Command::Admin(AdminCmd::DeleteDevice(DeviceId(id(d, "device")?))),
            ["admin", "customers"] => Command::Admin(AdminCmd::Customers),
            ["admin", "delete-customer", c] => Command::Admin(AdminCmd::DeleteCustomer(UserId(id(c, "customer")?))),
            ["admin", "employees"] => Command::Admin(AdminCmd::Employees),
            ["admin", "delete-employee", e] => Command::Admin(AdminCmd::DeleteEmployee(UserId(id(e, "employee")?))),
            ["admin", "logs"] => Command::Admin(AdminCmd::Logs(50)),
            ["admin", "logs", n] => Command::Admin(AdminCmd::Logs(count(n)?)),

            _ => return Err(format!("unrecognised command: {}\n\n{}", args.join(" "), USAGE)),
        };
        Ok(cmd)
    }
}

fn fill_prompt<S: Store>(prompt: &mut PlacementPrompt, store: &S, placement: &Placement) -> Result<(), PromptError> {
    prompt.select_house(store, Some(placement.house))?;
    prompt.select_room(Some(placement.room))?;
    prompt.select_category(Some(&placement.category))?;
    if let Some(name) = &placement.name {
        prompt.set_name(name);
    }
    prompt.set_icon(placement.icon.as_deref())?;
    Ok(())
}

macro_rules! say {
    ($out:expr, $($arg:tt)*) => {
        writeln!($out, $($arg)*).map_err(|e| format!("failed to write output: {}", e))?
    };
}

/// Handles the commands that need no backend. Returns false for the rest.
pub fn execute_offline<W: Write>(cmd: &Command, out: &mut W) -> Result<bool, String> {
    match cmd {
        Command::Help => say!(out, "{}", USAGE),
        Command::Categories => {
            for c in ELECTRONIC_OBJECTS {
                say!(out, "{}", c);
            }
        }
        Command::Icons => {
            for i in ICON_NAMES {
                say!(out, "{}", i);
            }
        }
        _ => return Ok(false),
    }
    Ok(true)
}

pub struct App<S, V> {
    store: S,
    otp: V,
    session: Session,
    scan_interval: Duration,
    scan_warmup: Duration,
}

impl<S: Store, V: OtpVerifier> App<S, V> {
    pub fn new(store: S, otp: V, session: Session, scan_interval: Duration, scan_warmup: Duration) -> Self {
        App {
            store,
            otp,
            session,
            scan_interval,
            scan_warmup,
        }
    }

    fn customer(&self) -> Result<SessionUser, String> {
        self.session.require_role(&[Role::Customer]).cloned()
    }

    fn staff(&self) -> Result<SessionUser, String> {
        self.session.require_role(&[Role::Admin, Role::Superadmin]).cloned()
    }

    pub fn execute<W: Write>(&mut self, cmd: Command, out: &mut W) -> Result<(), String> {
        if execute_offline(&cmd, out)? {
            return Ok(());
        }
        match cmd {
            Command::Help | Command::Categories | Command::Icons => {}
            Command::Health => {
                let up = self.otp.health().map_err(|e| e.to_string())?;
                say!(out, "OTP service {}", if up { "is reachable." } else { "answered with an error." });
            }
            Command::SendOtp(phone) => {
                auth::send_otp(&self.otp, &phone).map_err(|e| e.to_string())?;
                say!(out, "OTP sent to {}.", phone.trim());
            }
            Command::Login { role, phone, otp } => {
                let user = auth::login(&self.store, &self.otp, &mut self.session, role, &phone, &otp)
                    .map_err(|e| e.to_string())?;
                say!(out, "Welcome, {} ({}).", user.name, user.role);
            }
            Command::Signup {
                full_name,
                phone,
                email,
                otp,
            } => {
                let form = SignupForm {
                    full_name,
                    phone_number: phone,
                    email,
                };
                let user = auth::signup(&self.store, &self.otp, &mut self.session, &form, &otp)
                    .map_err(|e| e.to_string())?;
                say!(out, "Account created. Welcome, {}.", user.name);
            }
            Command::Logout => {
                auth::logout(&mut self.session).map_err(|e| e.to_string())?;
                say!(out, "Signed out.");
            }
            Command::WhoAmI => match self.session.current() {
                Some(u) => say!(
                    out,
                    "{} ({}) id={} phone={}{}",
                    u.name,
                    u.role,
                    u.id,
                    u.phone_number,
                    u.employee_id.as_deref().map(|e| format!(" employee={}", e)).unwrap_or_default()
                ),
                None => say!(out, "Not signed in."),
            },
            Command::Claim { code, placement } => self.claim(&code, &placement, false, out)?,
            Command::Scan(placement) => {
                let stdin = std::io::BufReader::new(std::io::stdin());
                self.scan(stdin, &placement, out)?
            }
            Command::Devices(c) => self.devices(c, out)?,
            Command::Share(c) => self.share(c, out)?,
            Command::Houses(c) => self.houses(c, out)?,
            Command::Rooms(c) => self.rooms(c, out)?,
            Command::Switches(c) => self.switches(c, out)?,
            Command::Admin(c) => self.admin(c, out)?,
        }
        Ok(())
    }

    /// Runs one claim through the orchestrator with a pre-filled placement.
    fn claim<W: Write>(&mut self, code: &str, placement: &Placement, scanned: bool, out: &mut W) -> Result<(), String> {
        self.customer()?;
        let mut flow = ClaimFlow::new();
        let submitted = if scanned {
            flow.submit_scanned(&self.store, &self.session, code)
        } else {
            flow.submit_manual(&self.store, &self.session, code)
        };
        if let Err(e) = submitted {
            let n = e.notice();
            return Err(format!("{} {}", n.title, n.description));
        }

        let filled = match flow.prompt_mut() {
            Some(prompt) => fill_prompt(prompt, &self.store, placement).map_err(|e| e.to_string()),
            None => Err("claim prompt did not open".to_string()),
        };
        if let Err(e) = filled {
            let _ = flow.cancel();
            return Err(e);
        }

        let how = if placement.name.is_some() {
            PromptSubmit::SaveName
        } else {
            PromptSubmit::Skip
        };
        match flow.commit(&self.store, &self.session, how) {
            Ok(report) => {
                say!(
                    out,
                    "{}",
                    report.success_message(placement.name.as_deref(), Some(&placement.category))
                );
                for w in &report.warnings {
                    say!(out, "warning: {}", w);
                }
                Ok(())
            }
            Err(e) => {
                let _ = flow.cancel();
                let n = e.notice();
                Err(format!("{} {}", n.title, n.description))
            }
        }
    }

    /// Waits for the first decoded payload on `input`, then claims it.
    pub fn scan<R: BufRead + Send + 'static, W: Write>(
        &mut self,
        input: R,
        placement: &Placement,
        out: &mut W,
    ) -> Result<(), String> {
        self.customer()?;
        let scan = ScanLoop::new(LineCapture::spawn(input), TextPayloadDecoder);
        let mut task = PollTask::spawn(scan, self.scan_interval, self.scan_warmup).map_err(|e| e.to_string())?;
        say!(out, "Point the scanner at a device label...");
        let detected = task.wait();
        let attempts = task.cancel();
        info!("Scanner stopped after {} decode attempt(s)", attempts);
        let code = detected.ok_or("scanner input ended before a code was read")?;
        say!(out, "Scanned {}", code);
        self.claim(&code, placement, true, out)
    }

    fn devices<W: Write>(&mut self, cmd: DevicesCmd, out: &mut W) -> Result<(), String> {
        let me = self.customer()?;
        match cmd {
            DevicesCmd::List => {
                let list = devices::list_owned(&self.store, me.id)?;
                if list.is_empty() {
                    say!(out, "No devices yet. Use `claim` or `scan` to add one.");
                }
                for d in list {
                    say!(
                        out,
                        "{:>6}  {:<16}  {:<24}  house={} room={} since={}",
                        d.id,
                        d.device_code,
                        d.label(),
                        or_dash(d.house_id),
                        or_dash(d.room_id),
                        or_dash(d.allocated_at.map(|t| t.format("%Y-%m-%d %H:%M")))
                    );
                }
            }
            DevicesCmd::Rename(id, name) => match devices::rename(&self.store, me.id, id, &name)? {
                Some(n) => say!(out, "Device {} is now \"{}\".", id, n),
                None => say!(out, "Device {} name cleared.", id),
            },
            DevicesCmd::Release(id) => {
                let report = devices::release(&self.store, me.id, id)?;
                say!(out, "Device {} removed from your account.", id);
                for w in report.warnings {
                    say!(out, "warning: {}", w);
                }
            }
            DevicesCmd::ReleaseAll => {
                let report = devices::release_all(&self.store, me.id)?;
                say!(out, "{} device(s) removed from your account.", report.released);
                for w in report.warnings {
                    say!(out, "warning: {}", w);
                }
            }
        }
        Ok(())
    }

    fn share<W: Write>(&mut self, cmd: ShareCmd, out: &mut W) -> Result<(), String> {
        let me = self.customer()?;
        match cmd {
            ShareCmd::Device(id, phone) => {
                let g = sharing::share_device(&self.store, me.id, id, &phone).map_err(|e| e.to_string())?;
                say!(out, "Device shared successfully with {}! (share {})", g.recipient.full_name, g.share_id);
            }
            ShareCmd::Switch(id, phone) => {
                let g = sharing::share_switch(&self.store, me.id, id, &phone).map_err(|e| e.to_string())?;
                say!(out, "Switch shared successfully with {}! (share {})", g.recipient.full_name, g.share_id);
            }
            ShareCmd::RevokeDevice(id) => {
                sharing::revoke_device_share(&self.store, me.id, id).map_err(|e| e.to_string())?;
                say!(out, "Share {} revoked.", id);
            }
            ShareCmd::RevokeSwitch(id) => {
                sharing::revoke_switch_share(&self.store, me.id, id).map_err(|e| e.to_string())?;
                say!(out, "Share {} revoked.", id);
            }
            ShareCmd::Sent => {
                for s in sharing::sent_device_shares(&self.store, me.id).map_err(|e| e.to_string())? {
                    let who = s
                        .recipient
                        .map(|c| format!("{} ({})", c.full_name, c.phone_number))
                        .unwrap_or_else(|| format!("user {}", s.share.shared_with_user_id));
                    say!(out, "{:>6}  {:<24}  -> {}", s.share.id, s.device.label(), who);
                }
            }
            ShareCmd::Received => {
                for r in sharing::received_devices(&self.store, me.id).map_err(|e| e.to_string())? {
                    say!(out, "device {:>6}  {:<24}  share={}", r.device.id, r.device.label(), r.share.id);
                }
                for r in sharing::received_switches(&self.store, me.id).map_err(|e| e.to_string())? {
                    say!(
                        out,
                        "switch {:>6}  {:<24}  {}  share={}",
                        r.switch.id,
                        r.switch.electronic_object,
                        if r.switch.is_on() { "on" } else { "off" },
                        r.share.id
                    );
                }
            }
        }
        Ok(())
    }

    fn houses<W: Write>(&mut self, cmd: HousesCmd, out: &mut W) -> Result<(), String> {
        let me = self.customer()?;
        match cmd {
            HousesCmd::List => {
                for h in homes::list_houses(&self.store, me.id)? {
                    say!(out, "{:>6}  {}", h.id, h.house_name);
                }
            }
            HousesCmd::Add(name) => {
                let h = homes::create_house(&self.store, me.id, &name)?;
                say!(out, "House \"{}\" created (id {}).", h.house_name, h.id);
            }
            HousesCmd::Rename(id, name) => {
                homes::rename_house(&self.store, me.id, id, &name)?;
                say!(out, "House {} renamed.", id);
            }
            HousesCmd::Delete(id) => {
                homes::delete_house(&self.store, me.id, id)?;
                say!(out, "House {} deleted.", id);
            }
        }
        Ok(())
    }

    fn rooms<W: Write>(&mut self, cmd: RoomsCmd, out: &mut W) -> Result<(), String> {
        let me = self.customer()?;
        match cmd {
            RoomsCmd::List(house) => {
                for r in homes::list_rooms(&self.store, me.id, house)? {
                    say!(out, "{:>6}  {:<20}  {}", r.id, r.label(), r.description.as_deref().unwrap_or(""));
                }
            }
            RoomsCmd::Add(house, kind, description) => {
                let r = homes::create_room(&self.store, me.id, house, &kind, description.as_deref())?;
                say!(out, "Room \"{}\" created (id {}).", r.label(), r.id);
            }
            RoomsCmd::Update(id, kind, description) => {
                homes::update_room(&self.store, me.id, id, &kind, description.as_deref())?;
                say!(out, "Room {} updated.", id);
            }
            RoomsCmd::Delete(id) => {
                homes::delete_room(&self.store, me.id, id)?;
                say!(out, "Room {} deleted.", id);
            }
        }
        Ok(())
    }

    fn switches<W: Write>(&mut self, cmd: SwitchesCmd, out: &mut W) -> Result<(), String> {
        let me = self.customer()?;
        match cmd {
            SwitchesCmd::List(room) => {
                for s in switches::list(&self.store, me.id, room)? {
                    say!(
                        out,
                        "{:>6}  {:<24}  {}",
                        s.id,
                        s.electronic_object,
                        if s.is_on() { "on" } else { "off" }
                    );
                }
            }
            SwitchesCmd::Set(id, on) => {
                switches::set_state(&self.store, me.id, id, on)?;
                say!(out, "Switch {} is {}.", id, if on { "on" } else { "off" });
            }
            SwitchesCmd::Toggle(id) => {
                let on = switches::toggle(&self.store, me.id, id)?;
                say!(out, "Switch {} is {}.", id, if on { "on" } else { "off" });
            }
            SwitchesCmd::Label(id, label) => {
                let c = switches::relabel(&self.store, me.id, id, &label)?;
                say!(out, "Switch {} is now a {}.", id, c);
            }
            SwitchesCmd::Delete(id) => {
                switches::delete(&self.store, me.id, id)?;
                say!(out, "Switch {} deleted.", id);
            }
        }
        Ok(())
    }

    fn admin<W: Write>(&mut self, cmd: AdminCmd, out: &mut W) -> Result<(), String> {
        let me = self.staff()?;
        let super_only = || {
            if me.role == Role::Superadmin {
                Ok(())
            } else {
                Err("This action requires a super-admin account.".to_string())
            }
        };
        match cmd {
            AdminCmd::Generate(n, qr_dir) => {
                let created = admin::generate_devices(&self.store, &mut rand::rng(), n)?;
                say!(out, "{} device(s) generated successfully.", created.len());
                for d in &created {
                    say!(out, "{:>6}  {}", d.id, d.device_code);
                }
                if let Some(dir) = qr_dir {
                    let written = labels::write_labels(&dir, &created)?;
                    say!(out, "{} QR label(s) written to {}", written.len(), dir.display());
                }
            }
            AdminCmd::Qr(id) => {
                let d = admin::find_device(&self.store, id)?;
                say!(out, "{}", labels::render_terminal(&d.device_code)?);
                say!(out, "{}", d.device_code);
            }
            AdminCmd::Devices(qr_dir) => {
                let list = admin::list_devices(&self.store)?;
                if let Some(dir) = qr_dir {
                    let written = labels::write_labels(&dir, &list)?;
                    say!(out, "{} QR label(s) written to {}", written.len(), dir.display());
                }
                for d in list {
                    say!(
                        out,
                        "{:>6}  {:<16}  owner={:<20}  m2m={}",
                        d.id,
                        d.device_code,
                        d.allocated_to_customer_name.as_deref().unwrap_or("-"),
                        d.device_m2m_number.as_deref().map(mask_secret).unwrap_or_else(|| "-".into())
                    );
                }
            }
            AdminCmd::M2m(id, number) => match admin::set_m2m_number(&self.store, id, &number)? {
                Some(_) => say!(out, "M2M number updated successfully."),
                None => say!(out, "M2M number cleared."),
            },
            AdminCmd::DeleteDevice(id) => {
                admin::delete_device(&self.store, id)?;
                say!(out, "Device {} deleted.", id);
            }
            AdminCmd::Customers => {
                for c in admin::list_customers(&self.store)? {
                    say!(
                        out,
                        "{:>6}  {:<24}  {:<16}  {}",
                        c.id,
                        c.full_name,
                        c.phone_number,
                        c.email.as_deref().unwrap_or("-")
                    );
                }
            }
            AdminCmd::DeleteCustomer(id) => {
                admin::delete_customer(&self.store, id)?;
                say!(out, "Customer {} deleted.", id);
            }
            AdminCmd::Employees => {
                super_only()?;
                for e in admin::list_employees(&self.store)? {
                    say!(
                        out,
                        "{:>6}  {:<10}  {:<24}  {:<16}  {}",
                        e.id,
                        e.employee_id,
                        e.full_name,
                        e.phone_number,
                        e.role.as_deref().unwrap_or("-")
                    );
                }
            }
            AdminCmd::DeleteEmployee(id) => {
                super_only()?;
                admin::delete_employee(&self.store, id)?;
                say!(out, "Employee {} deleted.", id);
            }
            AdminCmd::Logs(limit) => {
                super_only()?;
                for l in admin::login_logs(&self.store, limit)? {
                    say!(out, "{}  {}", l.login_time.format("%Y-%m-%d %H:%M:%S UTC"), l.employee_id);
                }
            }
        }
        Ok(())
    }
}
