//! Run compiled pods under bash against a fake engine.
//!
//! The fake is a `docker` shell function prepended to the script. It keeps its state in a
//! scratch directory: one directory per network, volume and container, with container
//! processes running on the host. Every call is appended to `calls.log`.

use std::{
    fs,
    process::{Command, Stdio},
    thread::sleep,
    time::{Duration, Instant},
};

use podscript::{
    podspec::{ContainerSpec, PullPolicy, VolumeMount, VolumeSpec},
    CompileOptions, Compiler, NetworkMode, PodSpec,
};
use tempfile::TempDir;

const FAKE_ENGINE: &str = r##"
docker() (
    state=$FAKE_DOCKER_STATE
    echo "$*" >>"$state/calls.log"

    stop() {
        local c=$1 i
        [ -f "$c/started" ] || return 0
        for i in $(seq 50); do
            [ -f "$c/pid" ] && break
            sleep 0.1
        done
        [ -f "$c/exit" ] || kill -KILL "$(cat "$c/pid")" 2>/dev/null
        for i in $(seq 50); do
            [ -f "$c/exit" ] && break
            sleep 0.1
        done
    }

    cmd=$1
    shift
    case "$cmd" in
    version)
        [ -z "$FAKE_DOCKER_DOWN" ]
        ;;
    network | volume)
        dir=$state/${cmd}s
        sub=$1
        shift
        case "$sub" in
        create)
            while [ "$#" -gt 1 ]; do shift; done
            mkdir "$dir/$1"
            ;;
        inspect) [ -d "$dir/$1" ] ;;
        rm) rmdir "$dir/$1" ;;
        *) exit 1 ;;
        esac
        ;;
    pull)
        case "$1" in
        *missing*)
            echo "pull access denied for $1" >&2
            exit 1
            ;;
        esac
        ;;
    create)
        name=
        entrypoint=
        envs=()
        while [ "$#" -gt 0 ]; do
            case "$1" in
            --name) name=$2; shift 2 ;;
            --entrypoint) entrypoint=$2; shift 2 ;;
            -e) envs+=("$2"); shift 2 ;;
            --label | --network | --network-alias | -v | -w | --pull) shift 2 ;;
            *) break ;;
            esac
        done
        image=$1
        shift
        if [ "$image" = nosuchimage ]; then
            echo "Unable to find image '$image' locally" >&2
            exit 125
        fi
        c=$state/containers/$name
        mkdir "$c" || exit 125
        if [ -n "$entrypoint" ]; then set -- "$entrypoint" "$@"; fi
        if [ "$#" -eq 0 ]; then set -- true; fi
        printf '%s\0' env "${envs[@]}" "$@" >"$c/argv"
        ;;
    start)
        attach=
        if [ "$1" = -a ]; then
            attach=1
            shift
        fi
        c=$state/containers/$1
        [ -f "$c/argv" ] || exit 1
        mapfile -d '' argv <"$c/argv"
        if [ -n "$attach" ]; then
            "${argv[@]}" </dev/null &
            echo $! >"$c/pid"
            : >"$c/started"
            wait $!
            code=$?
            echo "$code" >"$c/exit"
            exit "$code"
        fi
        : >"$c/started"
        (
            "${argv[@]}" >"$c/log" 2>&1 &
            echo $! >"$c/pid"
            wait $!
            echo $? >"$c/exit.tmp" && mv "$c/exit.tmp" "$c/exit"
        ) </dev/null >/dev/null 2>&1 3>&- &
        ;;
    wait)
        c=$state/containers/$1
        while [ ! -f "$c/exit" ]; do
            if [ ! -d "$c" ]; then
                echo "No such container: $1" >&2
                exit 1
            fi
            sleep 0.1
        done
        case " $FAKE_DOCKER_SLOW_WAIT " in
        *" $1 "*) sleep 2 ;;
        esac
        cat "$c/exit"
        ;;
    kill)
        for name in "$@"; do
            stop "$state/containers/$name"
        done
        ;;
    rm)
        [ "$1" = -f ] && shift
        c=$state/containers/$1
        [ -d "$c" ] || exit 1
        case " $FAKE_DOCKER_STUCK " in
        *" $1 "*)
            echo "Error response from daemon: could not remove container $1" >&2
            exit 1
            ;;
        esac
        stop "$c"
        rm -rf "$c"
        ;;
    logs)
        cat "$state/containers/$1/log" 2>/dev/null
        ;;
    container)
        [ "$1" = inspect ] || exit 1
        shift
        format=
        if [ "$1" = --format ]; then
            format=1
            shift 2
        fi
        c=$state/containers/$1
        [ -d "$c" ] || exit 1
        if [ -z "$format" ]; then
            echo "$1"
        elif [ -f "$c/exit" ]; then
            echo "exited $(cat "$c/exit")"
        elif [ -f "$c/started" ]; then
            echo "running 0"
        else
            echo "created 0"
        fi
        ;;
    *)
        echo "unknown command $cmd" >&2
        exit 1
        ;;
    esac
)
"##;

struct Engine {
    state: TempDir,
    options: CompileOptions,
}

struct Run {
    code: i32,
    stderr: String,
    elapsed: Duration,
}

impl Engine {
    fn new() -> Self {
        Self::with_options(CompileOptions::default())
    }

    fn with_options(options: CompileOptions) -> Self {
        let state = tempfile::tempdir().unwrap();
        for dir in ["containers", "networks", "volumes"] {
            fs::create_dir(state.path().join(dir)).unwrap();
        }
        Self { state, options }
    }

    fn command(&self, spec: &PodSpec, env: &[(&str, &str)]) -> Command {
        let unit = Compiler::new(self.options.clone())
            .compile(spec)
            .unwrap();
        let mut command = Command::new("bash");
        command
            .arg("-c")
            .arg(format!("{}\n{}", FAKE_ENGINE, unit.script()))
            .env("FAKE_DOCKER_STATE", self.state.path())
            .env_remove("FAKE_DOCKER_DOWN")
            .env_remove("FAKE_DOCKER_SLOW_WAIT")
            .env_remove("FAKE_DOCKER_STUCK")
            .envs(env.iter().copied());
        command
    }

    fn run(&self, spec: &PodSpec) -> Run {
        self.run_with(spec, &[])
    }

    fn run_with(&self, spec: &PodSpec, env: &[(&str, &str)]) -> Run {
        let started = Instant::now();
        let out = self.command(spec, env).output().unwrap();
        Run {
            code: out.status.code().unwrap(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            elapsed: started.elapsed(),
        }
    }

    /// Networks, volumes and containers still present.
    fn leftovers(&self) -> Vec<String> {
        let mut left = Vec::new();
        for dir in ["containers", "networks", "volumes"] {
            for entry in fs::read_dir(self.state.path().join(dir)).unwrap() {
                left.push(format!("{}/{}", dir, entry.unwrap().file_name().to_string_lossy()));
            }
        }
        left
    }

    fn calls(&self) -> String {
        fs::read_to_string(self.state.path().join("calls.log")).unwrap_or_default()
    }

    /// Start the pod, send SIGTERM once `ready` holds and wait for the script to exit.
    fn terminate_when(&self, spec: &PodSpec, ready: impl Fn(&Engine) -> bool) -> Run {
        let mut child = self
            .command(spec, &[])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while !ready(self) {
            assert!(Instant::now() < deadline, "pod never got ready to be terminated");
            sleep(Duration::from_millis(50));
        }
        let terminated = Instant::now();
        let killed = Command::new("kill")
            .arg("-TERM")
            .arg(child.id().to_string())
            .status()
            .unwrap();
        assert!(killed.success());

        let out = child.wait_with_output().unwrap();
        Run {
            code: out.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            elapsed: terminated.elapsed(),
        }
    }
}

fn shell(name: &str, script: &str) -> ContainerSpec {
    ContainerSpec {
        command: Some(vec!["sh".into(), "-c".into(), script.into()]),
        ..ContainerSpec::new(name, "busybox")
    }
}

fn pod(name: &str, containers: Vec<ContainerSpec>) -> PodSpec {
    PodSpec {
        name: name.into(),
        containers,
        ..Default::default()
    }
}

#[test]
fn all_containers_succeed() {
    let engine = Engine::new();
    let mut spec = pod(
        "happy",
        vec![
            shell("greeter", "echo hello from greeter"),
            shell("slow", "sleep 0.5; echo slow done"),
        ],
    );
    spec.init_containers = vec![shell("setup", "exit 0")];
    spec.volumes = vec![VolumeSpec::empty_dir("shared")];
    for container in spec.init_containers.iter_mut().chain(&mut spec.containers) {
        container.volume_mounts = vec![VolumeMount::new("shared", "/shared")];
    }

    let run = engine.run(&spec);
    assert_eq!(run.code, 0, "{}", run.stderr);
    assert!(run.stderr.contains("hello from greeter"), "{}", run.stderr);
    assert!(run.stderr.contains("slow done"), "{}", run.stderr);
    assert_eq!(engine.leftovers(), Vec::<String>::new());
    assert!(engine.calls().contains("volume create --label podscript.pod=happy happy-vol-0"));
    assert!(engine.calls().contains("volume rm happy-vol-0"));
}

#[test]
fn failed_init_container_stops_the_pod() {
    let engine = Engine::new();
    let mut spec = pod("initfail", vec![shell("main", "echo never")]);
    spec.init_containers = vec![shell("first", "exit 0"), shell("second", "exit 10")];

    let run = engine.run(&spec);
    assert_eq!(run.code, 10, "{}", run.stderr);
    assert!(run
        .stderr
        .contains("init container second exited with code 10"));
    assert!(!engine.calls().contains("--name initfail-ctr-0"));
    assert_eq!(engine.leftovers(), Vec::<String>::new());
}

#[test]
fn first_failure_ends_the_pod_early() {
    let engine = Engine::new();
    let spec = pod(
        "fastfail",
        vec![shell("steady", "sleep 30"), shell("flaky", "sleep 1; exit 13")],
    );

    let run = engine.run(&spec);
    assert_eq!(run.code, 13, "{}", run.stderr);
    assert!(run.elapsed < Duration::from_secs(15), "took {:?}", run.elapsed);
    assert!(engine.calls().contains("kill fastfail-ctr-0 fastfail-ctr-1"));
    assert_eq!(engine.leftovers(), Vec::<String>::new());
}

#[test]
fn simultaneous_failures_report_the_first_declared() {
    let engine = Engine::new();
    let spec = pod("tie", vec![shell("first", "exit 7"), shell("second", "exit 9")]);

    // the second container's exit is observed first
    let run = engine.run_with(&spec, &[("FAKE_DOCKER_SLOW_WAIT", "tie-ctr-0")]);
    assert_eq!(run.code, 7, "{}", run.stderr);
    assert!(run
        .stderr
        .contains("container tie-ctr-0 failed with exit code 7"));
    assert_eq!(engine.leftovers(), Vec::<String>::new());
}

#[test]
fn missing_image_fails_the_launch() {
    let engine = Engine::new();
    let spec = pod(
        "noimage",
        vec![
            shell("fine", "sleep 30"),
            ContainerSpec::new("broken", "nosuchimage"),
        ],
    );

    let run = engine.run(&spec);
    assert_eq!(run.code, 125, "{}", run.stderr);
    assert!(run.stderr.contains("failed to create container broken"));
    assert!(!engine.calls().contains("start noimage-ctr-0"));
    assert_eq!(engine.leftovers(), Vec::<String>::new());
}

#[test]
fn failed_pull_fails_the_launch() {
    let engine = Engine::new();
    let spec = pod(
        "nopull",
        vec![ContainerSpec {
            pull_policy: PullPolicy::Always,
            ..ContainerSpec::new("main", "example.com/missing")
        }],
    );

    let run = engine.run(&spec);
    assert_eq!(run.code, 125, "{}", run.stderr);
    assert!(!engine.calls().contains("create --name nopull-ctr-0"));
    assert_eq!(engine.leftovers(), Vec::<String>::new());
}

#[test]
fn unreachable_engine_fails_provisioning() {
    let engine = Engine::new();
    let spec = pod("down", vec![shell("main", "exit 0")]);

    let run = engine.run_with(&spec, &[("FAKE_DOCKER_DOWN", "1")]);
    assert_eq!(run.code, 122, "{}", run.stderr);
    assert!(run.stderr.contains("container engine docker is unreachable"));
    assert!(!engine.calls().contains("network create"));
}

#[test]
fn sigterm_tears_the_pod_down() {
    let engine = Engine::new();
    let spec = pod(
        "term",
        vec![shell("a", "sleep 30"), shell("b", "sleep 30")],
    );

    let run = engine.terminate_when(&spec, |e| e.calls().contains("wait term-ctr-1"));
    assert_eq!(run.code, 143, "{}", run.stderr);
    assert!(run.elapsed < Duration::from_secs(10), "took {:?}", run.elapsed);
    assert_eq!(engine.leftovers(), Vec::<String>::new());
}

#[test]
fn sigterm_during_init_does_not_wait_for_the_init_container() {
    let engine = Engine::new();
    let mut spec = pod("terminit", vec![shell("main", "exit 0")]);
    spec.init_containers = vec![shell("slow", "sleep 20")];

    let run = engine.terminate_when(&spec, |e| {
        e.state
            .path()
            .join("containers/terminit-init-0/pid")
            .exists()
    });
    assert_eq!(run.code, 143, "{}", run.stderr);
    assert!(run.elapsed < Duration::from_secs(5), "took {:?}", run.elapsed);
    assert!(!engine.calls().contains("--name terminit-ctr-0"));
    assert_eq!(engine.leftovers(), Vec::<String>::new());
}

#[test]
fn containers_share_the_sandbox_namespace_by_default() {
    let engine = Engine::new();
    let spec = pod(
        "netns",
        vec![shell("sidecar", "exit 0"), shell("worker", "exit 0")],
    );

    let run = engine.run(&spec);
    assert_eq!(run.code, 0, "{}", run.stderr);
    let calls = engine.calls();
    assert!(calls.contains("create --name netns-sandbox --label podscript.pod=netns --network netns-net"));
    assert!(calls.contains("start netns-sandbox"));
    assert_eq!(calls.matches("--network container:netns-sandbox").count(), 2);
    assert!(!calls.contains("--network-alias"));
    let removed = |name: &str| {
        calls
            .find(&format!("rm -f {}", name))
            .unwrap_or_else(|| panic!("{name} was not removed"))
    };
    assert!(removed("netns-ctr-0") < removed("netns-sandbox"));
    assert_eq!(engine.leftovers(), Vec::<String>::new());
}

#[test]
fn bridge_mode_uses_network_aliases() {
    let engine = Engine::with_options(CompileOptions {
        network_mode: NetworkMode::Bridge,
        ..Default::default()
    });
    let spec = pod(
        "bridged",
        vec![shell("sidecar", "exit 0"), shell("worker", "exit 0")],
    );

    let run = engine.run(&spec);
    assert_eq!(run.code, 0, "{}", run.stderr);
    let calls = engine.calls();
    assert!(calls.contains("--network bridged-net --network-alias worker"));
    assert!(!calls.contains("sandbox"));
    assert_eq!(engine.leftovers(), Vec::<String>::new());
}

#[test]
fn failed_removal_does_not_stop_teardown() {
    let engine = Engine::new();
    let mut spec = pod(
        "stuck",
        vec![shell("first", "exit 0"), shell("second", "exit 0"), shell("third", "exit 0")],
    );
    spec.volumes = vec![VolumeSpec::empty_dir("scratch")];
    spec.containers[0].volume_mounts = vec![VolumeMount::new("scratch", "/scratch")];

    let run = engine.run_with(&spec, &[("FAKE_DOCKER_STUCK", "stuck-ctr-1")]);
    assert_eq!(run.code, 0, "{}", run.stderr);
    assert!(run
        .stderr
        .contains("podscript: failed to remove container stuck-ctr-1"));
    assert_eq!(engine.leftovers(), ["containers/stuck-ctr-1"]);
    let calls = engine.calls();
    assert!(calls.contains("rm -f stuck-ctr-0"));
    assert!(calls.contains("network rm stuck-net"));
    assert!(calls.contains("volume rm stuck-vol-0"));
}
