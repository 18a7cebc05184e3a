use std::fs;
use std::io::Read;
use std::path::PathBuf;

use tempfile::tempdir;

use distestor::environment_factory::{
    EnvironmentFactory, LocalEnvironmentFactory, ROOT_DIR_PROPERTY,
};
use distestor::error::EnvironmentError;

// 目录复制进环境，再原样复制出来
#[test]
fn directory_round_trip_through_local_environments() {
    let source = tempdir().unwrap();
    let tree = source.path().join("bundle");
    fs::create_dir_all(tree.join("conf/nested")).unwrap();
    fs::write(tree.join("run.sh"), "echo hi\n").unwrap();
    fs::write(tree.join("conf/nested/app.toml"), "port = 1\n").unwrap();

    let factory = LocalEnvironmentFactory::new(2, "distestor-it").unwrap();
    let envs = factory.create().unwrap();
    assert_eq!(envs.len(), 2);

    let collected = tempdir().unwrap();
    for env in &envs {
        env.copy_files_from_local_disk(&tree, "deploy").unwrap();

        let process = env
            .run_command(&["sh", "-c", "cat deploy/bundle/conf/nested/app.toml"])
            .unwrap();
        assert_eq!(process.wait_for().unwrap(), 0);
        let mut out = String::new();
        process
            .take_stdout()
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "port = 1\n");

        let dest = collected.path().join(env.id().to_string());
        env.copy_files_to_local_disk("deploy/bundle", &dest).unwrap();
        assert_eq!(
            fs::read_to_string(dest.join("bundle/run.sh")).unwrap(),
            "echo hi\n"
        );
        assert_eq!(
            fs::read_to_string(dest.join("bundle/conf/nested/app.toml")).unwrap(),
            "port = 1\n"
        );
    }

    let roots: Vec<PathBuf> = envs
        .iter()
        .map(|env| env.properties().get::<PathBuf>(ROOT_DIR_PROPERTY).unwrap())
        .collect();
    assert_ne!(roots[0], roots[1]);

    factory.destroy(&envs);
    assert!(roots.iter().all(|root| !root.exists()));
}

// 环境之间互不可见，越界路径被拒绝
#[test]
fn environments_are_isolated() {
    let factory = LocalEnvironmentFactory::new(2, "distestor-it").unwrap();
    let envs = factory.create().unwrap();

    envs[0].mkdirs("logs/today").unwrap();
    let process = envs[1].run_command(&["test", "-d", "logs"]).unwrap();
    assert_ne!(process.wait_for().unwrap(), 0);

    let err = envs[0].remove_file("../").err().unwrap();
    assert!(matches!(err, EnvironmentError::PathOutsideHome { .. }));

    factory.destroy(&envs);
}
